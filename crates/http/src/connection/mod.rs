//! HTTP connection handling module
//!
//! # Components
//!
//! - [`HttpConnection`]: the per-connection loop that:
//!   - Frames and parses request heads
//!   - Runs the handler on an [`Exchange`](crate::exchange::Exchange)
//!   - Skips unread request bodies
//!   - Decides keep-alive per protocol version
//!   - Answers unusable requests with a 500 and closes
//!
//! - [`Listener`]: binds a TCP socket, accepts connections on its own task and
//!   runs every connection on a task obtained from a [`Spawn`] implementation.
//!   [`Listener::stop`] stops accepting and asks open connections to close.

mod http_connection;
mod listener;

pub use http_connection::HttpConnection;
pub use listener::Listener;
pub use listener::Spawn;
