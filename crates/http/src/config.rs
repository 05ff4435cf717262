//! Server configuration.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use thiserror::Error;

use crate::codec::DEFAULT_MAX_HEAD_SIZE;
use crate::ensure;

/// Smallest accepted request head buffer.
pub const MIN_HEAD_SIZE: usize = 1024;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_BACKLOG: u32 = 100;

/// Settings of a [`Listener`](crate::connection::Listener).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the listening socket binds to; port 0 picks a free port.
    pub address: SocketAddr,
    /// Pending-connection queue length passed to `listen`.
    pub backlog: u32,
    /// Capacity of the buffer a request head must fit in.
    pub max_head_size: usize,
}

impl ServerConfig {
    pub fn new(address: SocketAddr) -> Self {
        Self { address, ..Self::default() }
    }

    #[must_use]
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    #[must_use]
    pub fn with_max_head_size(mut self, max_head_size: usize) -> Self {
        self.max_head_size = max_head_size;
        self
    }

    /// Checks the settings before any socket is opened.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the backlog is zero or the head buffer is
    /// smaller than [`MIN_HEAD_SIZE`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(self.backlog > 0, ConfigError::ZeroBacklog);
        ensure!(self.max_head_size >= MIN_HEAD_SIZE, ConfigError::head_size_too_small(self.max_head_size));
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            backlog: DEFAULT_BACKLOG,
            max_head_size: DEFAULT_MAX_HEAD_SIZE,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("max head size {size} is below the minimum {min}")]
    HeadSizeTooSmall { size: usize, min: usize },

    #[error("backlog must be greater than zero")]
    ZeroBacklog,

    #[error("can't bind {address}: {source}")]
    Bind { address: SocketAddr, source: io::Error },
}

impl ConfigError {
    pub fn head_size_too_small(size: usize) -> Self {
        Self::HeadSizeTooSmall { size, min: MIN_HEAD_SIZE }
    }

    pub fn bind(address: SocketAddr, source: io::Error) -> Self {
        Self::Bind { address, source }
    }
}
