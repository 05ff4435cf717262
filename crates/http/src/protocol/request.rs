//! HTTP request head representation.
//!
//! A [`RequestHead`] is produced once per request by the head parser and never
//! mutated afterwards. It keeps the request target unparsed; path and query
//! derivation happens lazily on the [`crate::exchange::Exchange`].

use bytes::Bytes;
use http::header::AsHeaderName;
use http::{HeaderMap, Method, Version};

/// The parsed request line and header lines of a single request.
#[derive(Debug, Clone)]
pub struct RequestHead {
    method: Method,
    target: String,
    version: Version,
    headers: HeaderMap,
    raw: Bytes,
}

impl RequestHead {
    pub(crate) fn new(method: Method, target: String, version: Version, headers: HeaderMap, raw: Bytes) -> Self {
        Self { method, target, version, headers, raw }
    }

    /// Returns the request method token.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the raw request target, path and query unsplit.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the request protocol, one of HTTP/0.9, HTTP/1.0 or HTTP/1.1.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the protocol token as it appears on the wire.
    pub fn protocol(&self) -> &'static str {
        protocol_token(self.version)
    }

    /// Returns all request headers in arrival order.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the first header with the given name, looked up case-insensitively.
    ///
    /// Values that are not visible ASCII are treated as absent.
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Returns every header with the given name, in arrival order.
    ///
    /// Repeated headers such as `Cookie` must be read through this method.
    pub fn header_all<K: AsHeaderName>(&self, name: K) -> impl Iterator<Item = &str> {
        self.headers.get_all(name).into_iter().filter_map(|value| value.to_str().ok())
    }

    /// Returns the raw head bytes, terminator included.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Determines if the response to this request may carry a body.
    ///
    /// Only `HEAD` suppresses the response body.
    pub fn allows_response_body(&self) -> bool {
        self.method != Method::HEAD
    }
}

pub(crate) fn protocol_token(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        _ => "HTTP/1.1",
    }
}
