//! The per-request/response exchange handed to handlers.
//!
//! An [`Exchange`] owns everything about one request/response pair: the parsed
//! [`RequestHead`], a length-restricted view of the request body, and the
//! response status, headers and body the handler builds up. It is created by
//! the connection loop for every request and dropped before the next request
//! head is read.
//!
//! # Connection lifecycle
//!
//! After the response is written the connection asks
//! [`Exchange::should_close_connection`]:
//!
//! | protocol | closes when                                                   |
//! |----------|---------------------------------------------------------------|
//! | HTTP/0.9 | always                                                        |
//! | HTTP/1.0 | the response `Connection` header is not `keep-alive`          |
//! | HTTP/1.1 | the response or request `Connection` header is `close`        |
//!
//! An HTTP/1.0 request that asks for `Connection: keep-alive` (in any letter
//! case) gets the header preset on its response, so keep-alive is honoured
//! unless the handler removes it.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use http::header::{AsHeaderName, IntoHeaderName, CONNECTION, CONTENT_LENGTH, EXPECT};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Version};
use once_cell::unsync::OnceCell;
use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tracing::{debug, info, warn};

use crate::codec::{HeadEncoder, ResponseHead};
use crate::ensure;
use crate::protocol::body::READ_CHUNK_SIZE;
use crate::protocol::{BodyReader, HttpError, ParseError, RequestHead, ResponseBody, SendError};

const KEEP_ALIVE: &str = "keep-alive";
const CLOSE: &str = "close";
const CONTINUE_RESPONSE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Callback run once the response of an exchange has been sent.
///
/// Receives the error the handler failed with, if any.
pub type CompleteListener = Box<dyn FnOnce(&Exchange<'_>, Option<&(dyn Error + Send + Sync + 'static)>) + Send>;

/// Mutable state of one request/response pair.
pub struct Exchange<'c> {
    head: RequestHead,
    remote_addr: Option<SocketAddr>,
    reader: &'c mut (dyn AsyncBufRead + Send + Unpin),
    writer: &'c mut (dyn AsyncWrite + Send + Unpin),

    body_length: u64,
    body_remaining: u64,
    continue_sent: bool,
    query_params: OnceCell<HashMap<String, String>>,

    status: StatusCode,
    status_message: Option<String>,
    headers: HeaderMap,
    body: ResponseBody,
    no_content_length: bool,
    response_sent: bool,
    force_close: bool,

    complete_listeners: Vec<CompleteListener>,
}

impl<'c> Exchange<'c> {
    /// Wraps a parsed request head and the connection streams.
    ///
    /// `reader` must be positioned right after the request head, so the first
    /// `Content-Length` bytes it yields are this request's body.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidContentLength`] when the `Content-Length`
    /// header is not a non-negative integer.
    pub fn new(
        head: RequestHead,
        reader: &'c mut (dyn AsyncBufRead + Send + Unpin),
        writer: &'c mut (dyn AsyncWrite + Send + Unpin),
        remote_addr: Option<SocketAddr>,
    ) -> Result<Self, ParseError> {
        let body_length = match head.headers().get(CONTENT_LENGTH) {
            None => 0,
            Some(value) => {
                let text = value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;
                text.trim().parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {text} is not u64")))?
            }
        };

        let mut headers = HeaderMap::new();
        if head.version() == Version::HTTP_10
            && head.header(CONNECTION).is_some_and(|value| value.eq_ignore_ascii_case(KEEP_ALIVE)) {
            headers.insert(CONNECTION, HeaderValue::from_static(KEEP_ALIVE));
        }

        Ok(Self {
            head,
            remote_addr,
            reader,
            writer,
            body_length,
            body_remaining: body_length,
            continue_sent: false,
            query_params: OnceCell::new(),
            status: StatusCode::OK,
            status_message: None,
            headers,
            body: ResponseBody::Empty,
            no_content_length: false,
            response_sent: false,
            force_close: false,
            complete_listeners: Vec::new(),
        })
    }

    // ---- request side ----

    pub fn request_head(&self) -> &RequestHead {
        &self.head
    }

    pub fn method(&self) -> &Method {
        self.head.method()
    }

    /// Returns the raw request target, path and query unsplit.
    pub fn target(&self) -> &str {
        self.head.target()
    }

    pub fn version(&self) -> Version {
        self.head.version()
    }

    /// Returns the protocol token, e.g. `HTTP/1.1`.
    pub fn protocol(&self) -> &'static str {
        self.head.protocol()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Returns the raw request head bytes.
    pub fn raw_request(&self) -> &Bytes {
        self.head.raw()
    }

    /// Returns the first request header with the given name.
    pub fn request_header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.head.header(name)
    }

    /// Returns every request header with the given name, in arrival order.
    pub fn request_headers<K: AsHeaderName>(&self, name: K) -> impl Iterator<Item = &str> {
        self.head.header_all(name)
    }

    /// Returns the request target up to the first `?`.
    pub fn path(&self) -> &str {
        let target = self.head.target();
        target.split_once('?').map_or(target, |(path, _)| path)
    }

    /// Returns the raw query string after the first `?`, if any.
    pub fn query_string(&self) -> Option<&str> {
        self.head.target().split_once('?').map(|(_, query)| query)
    }

    /// Returns all decoded query parameters.
    ///
    /// The query is parsed on first access: `+` and percent escapes are
    /// decoded, a segment without `=` maps to an empty value and a repeated
    /// name keeps its last value.
    pub fn query_params(&self) -> &HashMap<String, String> {
        self.query_params.get_or_init(|| match self.query_string() {
            Some(query) => serde_urlencoded::from_str::<Vec<(String, String)>>(query).unwrap_or_default().into_iter().collect(),
            None => HashMap::new(),
        })
    }

    /// Returns a decoded query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params().get(name).map(String::as_str)
    }

    /// Returns the declared request body length, 0 without `Content-Length`.
    pub fn body_length(&self) -> u64 {
        self.body_length
    }

    /// Writes the provisional `100 Continue` response if the client asked for it.
    ///
    /// Only HTTP/1.1 requests carrying `Expect: 100-continue` get one, and at
    /// most once per exchange. Reading the body calls this implicitly.
    pub async fn accept_request_body(&mut self) -> Result<(), SendError> {
        if self.continue_sent || !self.expects_continue() {
            return Ok(());
        }

        self.continue_sent = true;
        self.writer.write_all(CONTINUE_RESPONSE).await?;
        self.writer.flush().await?;
        info!("receive expect request header, sent continue response");
        Ok(())
    }

    /// Returns a reader over the request body, bounded by `Content-Length`.
    pub async fn request_body(&mut self) -> Result<BodyReader<'_>, SendError> {
        self.accept_request_body().await?;
        Ok(BodyReader::new(&mut *self.reader, &mut self.body_remaining))
    }

    /// Reads the whole (unread part of the) request body into memory.
    pub async fn read_body(&mut self) -> Result<Bytes, HttpError> {
        let capacity = usize::try_from(self.body_remaining).unwrap_or(usize::MAX).min(64 * 1024);
        let mut buf = Vec::with_capacity(capacity);
        self.request_body().await?.read_to_end(&mut buf).await.map_err(ParseError::io)?;
        Ok(Bytes::from(buf))
    }

    fn expects_continue(&self) -> bool {
        self.head.version() == Version::HTTP_11
            && self.head.header(EXPECT).is_some_and(|value| value.eq_ignore_ascii_case("100-continue"))
    }

    /// Discards whatever part of the request body the handler left unread.
    ///
    /// When the client is still waiting for `100 Continue` it has not sent the
    /// body; nothing is read and the connection is marked for closing instead.
    pub(crate) async fn drain_body(&mut self) -> Result<(), ParseError> {
        if self.body_remaining == 0 {
            return Ok(());
        }

        if self.expects_continue() && !self.continue_sent {
            debug!(unread = self.body_remaining, "body never accepted, closing connection after response");
            self.force_close = true;
            return Ok(());
        }

        let mut reader = BodyReader::new(&mut *self.reader, &mut self.body_remaining);
        let skipped = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
        debug!(skipped, "skipped unread request body");
        Ok(())
    }

    // ---- response side ----

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.warn_if_sent("status");
        self.status = status;
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    /// Overrides the reason phrase written after the status code.
    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.warn_if_sent("status message");
        self.status_message = Some(message.into());
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn response_header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Sets a response header, replacing any previous value.
    pub fn set_response_header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) {
        self.warn_if_sent("header");
        self.headers.insert(name, value);
    }

    /// Adds a response header without replacing earlier values of the same name.
    pub fn append_response_header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) {
        self.warn_if_sent("header");
        self.headers.append(name, value);
    }

    pub fn remove_response_header<K: AsHeaderName>(&mut self, name: K) {
        self.warn_if_sent("header");
        self.headers.remove(name);
    }

    /// Suppresses the computed `Content-Length` header.
    pub fn set_no_content_length(&mut self) {
        self.warn_if_sent("content length");
        self.no_content_length = true;
    }

    /// Drops any framing the handler chose so a replacement body is sent
    /// with its own computed `Content-Length`.
    pub(crate) fn reset_framing(&mut self) {
        self.headers.remove(CONTENT_LENGTH);
        self.no_content_length = false;
    }

    pub fn response_body(&self) -> &ResponseBody {
        &self.body
    }

    /// Assigns the response body, replacing any previous one.
    pub fn send(&mut self, body: impl Into<ResponseBody>) {
        self.warn_if_sent("body");
        self.body = body.into();
    }

    pub fn send_text(&mut self, text: impl Into<String>) {
        self.send(text.into());
    }

    /// Assigns a streamed body; at most `length` bytes of `reader` are written.
    pub fn send_stream<R>(&mut self, reader: R, length: u64)
    where
        R: tokio::io::AsyncRead + Send + Unpin + 'static,
    {
        self.send(ResponseBody::stream(reader, length));
    }

    pub fn is_response_sent(&self) -> bool {
        self.response_sent
    }

    /// Writes the response: status line, headers, blank line, then the body.
    ///
    /// Only the first call writes anything. HTTP/0.9 responses consist of the
    /// body alone, and `HEAD` responses report the body length but omit it.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] on transport failure or when a streamed body ends
    /// before its declared length.
    pub async fn send_response(&mut self) -> Result<(), SendError> {
        if self.response_sent {
            return Ok(());
        }
        self.response_sent = true;

        let body = std::mem::take(&mut self.body);

        if self.head.version() != Version::HTTP_09 {
            let mut dst = BytesMut::new();
            HeadEncoder.encode(
                ResponseHead {
                    version: self.head.version(),
                    status: self.status,
                    reason: self.status_message.as_deref(),
                    headers: &self.headers,
                    content_length: (!self.no_content_length).then(|| body.len()),
                },
                &mut dst,
            )?;
            self.writer.write_all(&dst).await?;
        }

        if self.head.allows_response_body() {
            write_body(&mut *self.writer, body).await?;
        }

        self.writer.flush().await?;
        debug!(method = %self.head.method(), path = self.path(), status = self.status.as_u16(), "response sent");
        Ok(())
    }

    /// Decides whether the connection closes after this exchange.
    pub fn should_close_connection(&self) -> bool {
        if self.force_close {
            return true;
        }

        match self.head.version() {
            Version::HTTP_10 => self.response_header(CONNECTION) != Some(KEEP_ALIVE),
            Version::HTTP_11 => self.response_header(CONNECTION) == Some(CLOSE) || self.head.header(CONNECTION) == Some(CLOSE),
            _ => true,
        }
    }

    /// Marks the connection for closing regardless of protocol and headers.
    pub(crate) fn close_after_response(&mut self) {
        self.force_close = true;
    }

    /// Registers a callback run after the response has been sent.
    pub fn add_complete_listener<F>(&mut self, listener: F)
    where
        F: FnOnce(&Exchange<'_>, Option<&(dyn Error + Send + Sync + 'static)>) + Send + 'static,
    {
        self.complete_listeners.push(Box::new(listener));
    }

    pub(crate) fn notify_complete(&mut self, error: Option<&(dyn Error + Send + Sync + 'static)>) {
        for listener in std::mem::take(&mut self.complete_listeners) {
            listener(&*self, error);
        }
    }

    fn warn_if_sent(&self, what: &str) {
        if self.response_sent {
            warn!(what, "response already sent, change has no effect");
        }
    }
}

async fn write_body(writer: &mut (dyn AsyncWrite + Send + Unpin), body: ResponseBody) -> Result<(), SendError> {
    match body {
        ResponseBody::Empty => Ok(()),
        ResponseBody::Bytes(bytes) => Ok(writer.write_all(&bytes).await?),
        ResponseBody::Stream { mut reader, length } => {
            let mut chunk = vec![0u8; READ_CHUNK_SIZE];
            let mut left = length;
            while left > 0 {
                let want = usize::try_from(left).unwrap_or(usize::MAX).min(chunk.len());
                let read = reader.read(&mut chunk[..want]).await?;
                ensure!(read != 0, SendError::invalid_body(format!("response stream ended {left} bytes short of {length}")));
                writer.write_all(&chunk[..read]).await?;
                left -= read as u64;
            }
            Ok(())
        }
    }
}

impl fmt::Debug for Exchange<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("head", &self.head)
            .field("remote_addr", &self.remote_addr)
            .field("body_remaining", &self.body_remaining)
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("response_sent", &self.response_sent)
            .finish_non_exhaustive()
    }
}
