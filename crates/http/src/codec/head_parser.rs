//! Request head parser.
//!
//! Splits a framed request head into the request line and header lines:
//!
//! 1. The first line is decoded as Latin-1 and split on single spaces into
//!    method, target and an optional protocol token. A missing token means
//!    HTTP/0.9.
//! 2. Header lines are parsed with `httparse::parse_headers` and appended to
//!    a `HeaderMap` in arrival order. Folded (continuation) lines are rejected.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Version};
use httparse::Status;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, RequestHead};

/// Maximum number of headers allowed in a request
pub const MAX_HEADER_NUM: usize = 64;

/// Parses framed request heads into [`RequestHead`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadParser;

impl HeadParser {
    /// Parses `raw`, which must hold a complete head including the blank-line terminator.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if:
    /// - the request line has no method or no target
    /// - the protocol token is not `HTTP/0.9`, `HTTP/1.0` or `HTTP/1.1`
    /// - the number of headers exceeds [`MAX_HEADER_NUM`]
    /// - a header line is malformed
    pub fn parse(&self, raw: Bytes) -> Result<RequestHead, ParseError> {
        let line_end = raw
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(|| ParseError::invalid_header("request line is not terminated"))?;

        // Latin-1: every byte maps to the char of the same code point.
        let request_line: String = raw[..line_end].iter().copied().map(char::from).collect();

        let (method, rest) = request_line.split_once(' ').ok_or(ParseError::InvalidMethod)?;
        let (target, version) = match rest.split_once(' ') {
            Some((target, protocol)) => (target, parse_version(protocol)?),
            None => (rest, Version::HTTP_09),
        };

        ensure!(!method.is_empty(), ParseError::InvalidMethod);
        ensure!(!target.is_empty(), ParseError::InvalidTarget);
        let method = Method::from_bytes(method.as_bytes()).map_err(|_| ParseError::InvalidMethod)?;

        let headers = parse_header_lines(&raw[line_end + 2..])?;
        trace!(%method, request_target = target, ?version, header_count = headers.len(), "parsed request head");

        Ok(RequestHead::new(method, target.to_owned(), version, headers, raw))
    }
}

fn parse_version(token: &str) -> Result<Version, ParseError> {
    match token {
        "HTTP/1.1" => Ok(Version::HTTP_11),
        "HTTP/1.0" => Ok(Version::HTTP_10),
        "HTTP/0.9" => Ok(Version::HTTP_09),
        other => Err(ParseError::invalid_version(other)),
    }
}

fn parse_header_lines(bytes: &[u8]) -> Result<HeaderMap, ParseError> {
    let mut parsed = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];

    let parsed = match httparse::parse_headers(bytes, &mut parsed) {
        Ok(Status::Complete((_, parsed))) => parsed,
        Ok(Status::Partial) => return Err(ParseError::invalid_header("header section is not terminated")),
        Err(httparse::Error::TooManyHeaders) => return Err(ParseError::too_many_headers(MAX_HEADER_NUM)),
        Err(e) => return Err(ParseError::invalid_header(e)),
    };

    let mut headers = HeaderMap::with_capacity(parsed.len());
    for header in parsed.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(ParseError::invalid_header)?;
        let value = HeaderValue::from_bytes(header.value).map_err(ParseError::invalid_header)?;
        headers.append(name, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn crlf(text: &str) -> Bytes {
        Bytes::from(text.replace('\n', "\r\n"))
    }

    #[test]
    fn from_curl() {
        let raw = crlf(indoc! {r##"
        GET /index.html?a=1 HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##});

        let head = HeadParser.parse(raw.clone()).unwrap();

        assert_eq!(head.method(), &Method::GET);
        assert_eq!(head.target(), "/index.html?a=1");
        assert_eq!(head.version(), Version::HTTP_11);
        assert_eq!(head.protocol(), "HTTP/1.1");
        assert_eq!(head.headers().len(), 3);
        assert_eq!(head.header("host"), Some("127.0.0.1:8080"));
        assert_eq!(head.header("USER-AGENT"), Some("curl/7.79.1"));
        assert_eq!(head.header(http::header::ACCEPT), Some("*/*"));
        assert_eq!(head.raw(), &raw);
    }

    #[test]
    fn missing_protocol_is_http_09() {
        let head = HeadParser.parse(crlf("GET /legacy\n\n")).unwrap();

        assert_eq!(head.version(), Version::HTTP_09);
        assert_eq!(head.target(), "/legacy");
        assert!(head.headers().is_empty());
    }

    #[test]
    fn http_10_request() {
        let head = HeadParser.parse(crlf("POST /form HTTP/1.0\nConnection: keep-alive\n\n")).unwrap();

        assert_eq!(head.method(), &Method::POST);
        assert_eq!(head.version(), Version::HTTP_10);
        assert_eq!(head.header("connection"), Some("keep-alive"));
    }

    #[test]
    fn latin1_target_is_kept() {
        let head = HeadParser.parse(Bytes::from_static(b"GET /caf\xe9?q=\xfc HTTP/1.1\r\nHost: x\r\n\r\n")).unwrap();

        assert_eq!(head.target(), "/caf\u{e9}?q=\u{fc}");
        assert_eq!(head.version(), Version::HTTP_11);
    }

    #[test]
    fn unknown_protocol_fails() {
        let result = HeadParser.parse(crlf("GET / HTTP/2.0\n\n"));
        assert!(matches!(result, Err(ParseError::InvalidVersion(token)) if token == "HTTP/2.0"));

        let result = HeadParser.parse(crlf("GET / http/1.1\n\n"));
        assert!(matches!(result, Err(ParseError::InvalidVersion(_))));
    }

    #[test]
    fn malformed_request_line_fails() {
        assert!(matches!(HeadParser.parse(crlf("GET\n\n")), Err(ParseError::InvalidMethod)));
        assert!(matches!(HeadParser.parse(crlf(" / HTTP/1.1\n\n")), Err(ParseError::InvalidMethod)));
        assert!(matches!(HeadParser.parse(crlf("GET  HTTP/1.1\n\n")), Err(ParseError::InvalidTarget)));
    }

    #[test]
    fn repeated_headers_keep_arrival_order() {
        let raw = crlf(indoc! {r##"
        GET / HTTP/1.1
        Cookie: a=1
        X-Other: x
        cookie: session=abc; theme=dark

        "##});

        let head = HeadParser.parse(raw).unwrap();

        assert_eq!(head.header("Cookie"), Some("a=1"));
        assert_eq!(head.header_all("COOKIE").collect::<Vec<_>>(), vec!["a=1", "session=abc; theme=dark"]);
        assert_eq!(head.header_all("missing").count(), 0);
    }

    #[test]
    fn folded_header_line_is_rejected() {
        let result = HeadParser.parse(crlf("GET / HTTP/1.1\nX-Long: a\n  continued\n\n"));
        assert!(matches!(result, Err(ParseError::InvalidHeader { .. })));
    }

    #[test]
    fn too_many_headers() {
        let mut text = String::from("GET / HTTP/1.1\n");
        for i in 0..=MAX_HEADER_NUM {
            text.push_str(&format!("X-Header-{i}: {i}\n"));
        }
        text.push('\n');

        let result = HeadParser.parse(crlf(&text));
        assert!(matches!(result, Err(ParseError::TooManyHeaders { max_num: MAX_HEADER_NUM })));
    }
}
