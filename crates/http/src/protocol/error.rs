use std::error::Error;
use std::io;
use thiserror::Error;

/// Top-level error of a connection loop.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("request head too large, exceed the limit {max_size}")]
    HeadTooLarge { max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(String),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http request target")]
    InvalidTarget,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn head_too_large(max_size: usize) -> Self {
        Self::HeadTooLarge { max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_version<S: ToString>(token: S) -> Self {
        Self::InvalidVersion(token.to_string())
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Errors a request handler raises to have a specific response rendered.
///
/// The connection renders these through [`crate::responder::render_error`]; any
/// other error type escaping a handler is answered with a generic 500.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Bad client input, rendered as 400 with a JSON error body.
    #[error("invalid input: {message}")]
    InvalidInput { error_code: u16, message: String },

    /// Missing or tampered credentials, rendered as 403 with a JSON error body.
    #[error("forbidden: {message}")]
    Forbidden { error_code: u16, message: String },

    /// Rendered as a bare 404.
    #[error("not found")]
    NotFound,

    /// Rendered as 302 with a `Location` header.
    #[error("redirect to {location}")]
    Redirect { location: String },

    #[error("internal error: {0}")]
    Internal(Box<dyn Error + Send + Sync>),
}

impl HandlerError {
    pub fn invalid_input<S: ToString>(message: S) -> Self {
        Self::InvalidInput { error_code: 400, message: message.to_string() }
    }

    pub fn invalid_input_with_code<S: ToString>(error_code: u16, message: S) -> Self {
        Self::InvalidInput { error_code, message: message.to_string() }
    }

    pub fn forbidden<S: ToString>(message: S) -> Self {
        Self::Forbidden { error_code: 403, message: message.to_string() }
    }

    pub fn forbidden_with_code<S: ToString>(error_code: u16, message: S) -> Self {
        Self::Forbidden { error_code, message: message.to_string() }
    }

    pub fn redirect<S: ToString>(location: S) -> Self {
        Self::Redirect { location: location.to_string() }
    }

    pub fn internal<E: Into<Box<dyn Error + Send + Sync>>>(e: E) -> Self {
        Self::Internal(e.into())
    }
}

impl From<ParseError> for HandlerError {
    fn from(e: ParseError) -> Self {
        Self::Internal(Box::new(e))
    }
}

impl From<SendError> for HandlerError {
    fn from(e: SendError) -> Self {
        Self::Internal(Box::new(e))
    }
}

impl From<HttpError> for HandlerError {
    fn from(e: HttpError) -> Self {
        Self::Internal(Box::new(e))
    }
}

impl From<io::Error> for HandlerError {
    fn from(e: io::Error) -> Self {
        Self::Internal(Box::new(e))
    }
}
