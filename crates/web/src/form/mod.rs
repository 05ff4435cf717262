//! Request body form parsing.
//!
//! - [`urlencoded`]: `application/x-www-form-urlencoded` bodies into a name/value map
//! - [`multipart`]: `multipart/form-data` bodies into ordered [`FormPart`]s
//!
//! Both read the body through the [`Exchange`](minihttp::exchange::Exchange), so
//! they never read past the declared `Content-Length`.

use std::io;

use minihttp::protocol::{HandlerError, HttpError, ParseError};
use thiserror::Error;

pub mod multipart;
pub mod urlencoded;

pub use multipart::{parse_multipart, read_multipart, FormPart, MAX_MULTIPART_SIZE};
pub use urlencoded::{parse_url_encoded, read_url_encoded};

#[derive(Error, Debug)]
pub enum FormError {
    #[error("unsupported content type {found:?}, expected {expected}")]
    UnsupportedContentType { expected: &'static str, found: String },

    #[error("multipart content type has no boundary")]
    MissingBoundary,

    #[error("form content too large: {length} bytes, limit {max}")]
    TooLarge { length: u64, max: u64 },

    #[error("malformed form, no CRLFCRLF between boundaries")]
    MalformedPart,

    #[error("filled buffer but more data still available")]
    BufferOverflow,

    #[error("can't decode form: {source}")]
    Decode {
        #[from]
        source: serde_urlencoded::de::Error,
    },

    #[error("can't read form body: {source}")]
    Http {
        #[from]
        source: HttpError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl FormError {
    pub fn unsupported_content_type<S: ToString>(expected: &'static str, found: S) -> Self {
        Self::UnsupportedContentType { expected, found: found.to_string() }
    }
}

/// A form that can't be framed is a protocol error: the connection answers
/// with a 500 and closes.
impl From<FormError> for HandlerError {
    fn from(e: FormError) -> Self {
        HandlerError::internal(ParseError::invalid_body(e))
    }
}
