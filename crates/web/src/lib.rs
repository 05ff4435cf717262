//! Request helpers for [`minihttp`] handlers.
//!
//! - [`form`]: URL-encoded and multipart form bodies
//! - [`params`]: typed parameters from forms and query strings
//! - [`session`]: cookie sessions, server side or signed
//!
//! Every helper works on a [`minihttp::exchange::Exchange`] and reports
//! failures as [`minihttp::protocol::HandlerError`], so a handler can use `?`
//! and let the connection pick the error response.

pub mod form;
pub mod params;
pub mod session;
