//! A minimal embeddable HTTP/1.x server core
//!
//! This crate provides a small HTTP/0.9, HTTP/1.0 and HTTP/1.1 server built on
//! top of tokio. It is meant to be embedded: the application supplies one
//! [`handler::Handler`] and the crate does the framing, parsing, keep-alive
//! bookkeeping and response serialization around it.
//!
//! # Features
//!
//! - Streaming request head framing with a fixed buffer limit
//! - Request bodies delimited by `Content-Length`, read lazily by the handler
//! - Pipelined requests answered in order
//! - Keep-alive rules per protocol version
//! - Expect-continue mechanism
//! - JSON error responses for failed handlers
//! - Graceful stop of the listener and its open connections
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use minihttp::config::ServerConfig;
//! use minihttp::connection::Listener;
//! use minihttp::handler::handler_fn;
//! use minihttp::protocol::HandlerError;
//! use tracing::{info, Level};
//! use tracing_subscriber::FmtSubscriber;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber)?;
//!
//!     let handler = Arc::new(handler_fn(|exchange| {
//!         Box::pin(async move {
//!             let body = exchange.read_body().await?;
//!             info!(path = exchange.path(), body_size = body.len(), "receiving request");
//!             exchange.send_text("Hello World!\r\n");
//!             Ok::<_, HandlerError>(())
//!         })
//!     }));
//!
//!     let listener = Listener::start(ServerConfig::new("127.0.0.1:8080".parse()?), handler)?;
//!     tokio::signal::ctrl_c().await?;
//!     listener.stop();
//!     listener.join().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`codec`]: request head framing and parsing, response head encoding
//! - [`protocol`]: request head, body and error types
//! - [`exchange`]: the per-request state handed to handlers
//! - [`handler`]: the handler trait and closure adapter
//! - [`responder`]: JSON error responses
//! - [`connection`]: the per-connection loop and the TCP listener
//! - [`config`]: listener settings
//!
//! ## Error Handling
//!
//! - [`protocol::HttpError`]: Top-level error of a connection loop
//! - [`protocol::ParseError`]: Request framing and parsing errors
//! - [`protocol::SendError`]: Response sending errors
//! - [`protocol::HandlerError`]: Errors handlers raise to choose the error response
//!
//! # Limitations
//!
//! - No chunked transfer encoding; request bodies need `Content-Length`
//! - No TLS support (use a reverse proxy for HTTPS)
//! - Default maximum head size: 8KB
//! - Maximum number of headers: 64

pub mod codec;
pub mod config;
pub mod connection;
pub mod exchange;
pub mod handler;
pub mod protocol;
pub mod responder;

mod utils;
pub(crate) use utils::ensure;
