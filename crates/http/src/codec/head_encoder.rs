//! Response head encoder.
//!
//! Serializes the status line and header block of a response:
//!
//! 1. `protocol SP status SP reason CRLF`
//! 2. every header set by the handler, as `name: value CRLF`
//! 3. a computed `Content-Length` unless suppressed or already set
//! 4. a `Date` header unless already set
//! 5. the blank line

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::{header, HeaderMap, StatusCode, Version};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::{protocol_token, SendError};

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Everything needed to write one response head.
#[derive(Debug)]
pub struct ResponseHead<'a> {
    pub version: Version,
    pub status: StatusCode,
    /// Overrides the canonical reason phrase of `status`.
    pub reason: Option<&'a str>,
    pub headers: &'a HeaderMap,
    /// Length to report when the handler did not set `Content-Length` itself.
    pub content_length: Option<u64>,
}

/// Encoder for response heads implementing the [`Encoder`] trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadEncoder;

impl Encoder<ResponseHead<'_>> for HeadEncoder {
    type Error = SendError;

    /// Encodes a response head into the provided bytes buffer.
    ///
    /// # Errors
    ///
    /// Returns error if the protocol is HTTP/0.9, which has no response head.
    fn encode(&mut self, item: ResponseHead<'_>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.version == Version::HTTP_09 {
            error!("http/0.9 responses carry no head");
            return Err(io::Error::from(io::ErrorKind::Unsupported).into());
        }

        dst.reserve(INIT_HEADER_SIZE);
        let reason = item.reason.or_else(|| item.status.canonical_reason()).unwrap_or("Unknown");
        write!(FastWrite(dst), "{} {} {}\r\n", protocol_token(item.version), item.status.as_str(), reason)?;

        for (header_name, header_value) in item.headers {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }

        if let Some(length) = item.content_length {
            if !item.headers.contains_key(header::CONTENT_LENGTH) {
                write!(FastWrite(dst), "content-length: {length}\r\n")?;
            }
        }

        if !item.headers.contains_key(header::DATE) {
            let mut date = faf_http_date::get_date_buff_no_key();
            faf_http_date::get_date_no_key(&mut date);
            dst.put_slice(b"date: ");
            dst.put_slice(&date);
            dst.put_slice(b"\r\n");
        }

        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Fast writer implementation for writing to BytesMut.
///
/// Lets `write!` format straight into the reserved buffer.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
