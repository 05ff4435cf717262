use std::error::Error;
use std::fmt;

use async_trait::async_trait;
use minihttp::exchange::Exchange;
use minihttp::protocol::HandlerError;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use super::{cookie_value, set_session_cookie, SessionStore, DEFAULT_COOKIE_NAME};

/// Number of random bytes in a session id, which is twice as long in hex.
pub const DEFAULT_ID_LENGTH: usize = 32;

type BackendError = Box<dyn Error + Send + Sync>;

/// Server side storage for [`RandomIdStore`], keyed by session id.
///
/// Backends are shared by every connection task and synchronize themselves.
#[async_trait]
pub trait SessionBackend<T: Send + 'static>: Send + Sync {
    async fn store(&self, id: &str, session: T) -> Result<(), BackendError>;

    async fn retrieve(&self, id: &str) -> Result<Option<T>, BackendError>;

    async fn remove(&self, id: &str) -> Result<(), BackendError>;
}

/// Session store whose cookie carries a random hex id.
pub struct RandomIdStore<B> {
    backend: B,
    id_length: usize,
    cookie_name: String,
}

impl<B> RandomIdStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, id_length: DEFAULT_ID_LENGTH, cookie_name: DEFAULT_COOKIE_NAME.to_owned() }
    }

    #[must_use]
    pub fn with_id_length(mut self, id_length: usize) -> Self {
        self.id_length = id_length;
        self
    }

    #[must_use]
    pub fn with_cookie_name(mut self, cookie_name: impl Into<String>) -> Self {
        self.cookie_name = cookie_name.into();
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn generate_id(&self) -> String {
        let mut bytes = vec![0u8; self.id_length];
        OsRng.fill_bytes(&mut bytes);
        hex(&bytes)
    }
}

fn hex(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";

    let mut text = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        text.push(char::from(DIGITS[usize::from(b >> 4)]));
        text.push(char::from(DIGITS[usize::from(b & 0x0f)]));
    }
    text
}

impl<B> fmt::Debug for RandomIdStore<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomIdStore")
            .field("id_length", &self.id_length)
            .field("cookie_name", &self.cookie_name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T, B> SessionStore<T> for RandomIdStore<B>
where
    T: Send + 'static,
    B: SessionBackend<T>,
{
    fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    async fn set_session(&self, exchange: &mut Exchange<'_>, session: T) -> Result<(), HandlerError> {
        let id = self.generate_id();
        self.backend.store(&id, session).await.map_err(HandlerError::Internal)?;

        debug!(cookie = %self.cookie_name, "created session");
        set_session_cookie(exchange, &self.cookie_name, &id)
    }

    async fn find_session(&self, exchange: &mut Exchange<'_>) -> Result<Option<T>, HandlerError> {
        let Some(id) = cookie_value(exchange, &self.cookie_name).map(str::to_owned) else {
            return Ok(None);
        };
        self.backend.retrieve(&id).await.map_err(HandlerError::Internal)
    }

    async fn delete_session(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
        let Some(id) = cookie_value(exchange, &self.cookie_name).map(str::to_owned) else {
            return Ok(());
        };
        self.backend.remove(&id).await.map_err(HandlerError::Internal)?;

        debug!(cookie = %self.cookie_name, "deleted session");
        set_session_cookie(exchange, &self.cookie_name, "")
    }
}
