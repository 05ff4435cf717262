//! Core HTTP protocol types.
//!
//! - **Request** ([`request`]): [`RequestHead`], the immutable parsed head
//! - **Bodies** ([`body`]): [`BodyReader`] for the length-restricted request body
//!   and [`ResponseBody`] for what gets written back
//! - **Errors** ([`error`]): [`HttpError`], [`ParseError`], [`SendError`] and the
//!   application-facing [`HandlerError`]

mod request;
pub use request::RequestHead;
pub(crate) use request::protocol_token;

mod error;
pub use error::HandlerError;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
pub use body::BodyReader;
pub use body::ResponseBody;
