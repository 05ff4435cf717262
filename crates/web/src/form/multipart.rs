//! Multipart form parsing.
//!
//! The body is scanned byte by byte into a buffer sized by `Content-Length`.
//! Every time the buffer ends with the delimiter `--<boundary>`, the two bytes
//! after it (the CRLF before the next part's headers) are taken and scanning
//! resumes. A part spans from after that CRLF to before the CRLF preceding
//! the next delimiter. When no further delimiter arrives the form is complete;
//! the closing delimiter is the one followed by `--`.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use http::header::CONTENT_TYPE;
use mime::Mime;
use minihttp::exchange::Exchange;
use minihttp::protocol::HttpError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use super::FormError;

/// Largest multipart body accepted.
pub const MAX_MULTIPART_SIZE: u64 = 64 * 1024;

const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// One segment of a multipart form.
///
/// Header values are captured as written; `Content-Disposition` parameters are
/// not decoded. The byte views share the buffer of the whole form.
#[derive(Clone)]
pub struct FormPart {
    headers: Vec<String>,
    content_type: Option<String>,
    disposition: Option<String>,
    raw: Bytes,
    data: Bytes,
}

impl FormPart {
    fn new(form: &Bytes, start: usize, end: usize) -> Result<Self, FormError> {
        let raw = form.slice(start..end);
        let separator = raw.windows(4).position(|window| window == b"\r\n\r\n").ok_or(FormError::MalformedPart)?;

        let mut headers = Vec::new();
        let mut content_type = None;
        let mut disposition = None;
        for line in String::from_utf8_lossy(&raw[..separator]).lines().filter(|line| !line.is_empty()) {
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-type") {
                    content_type = Some(value.trim().to_owned());
                } else if name.eq_ignore_ascii_case("content-disposition") {
                    disposition = Some(value.trim().to_owned());
                }
            }
            headers.push(line.to_owned());
        }

        let data = raw.slice(separator + 4..);
        Ok(Self { headers, content_type, disposition, raw, data })
    }

    /// Returns the header lines of the part, as received.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn disposition(&self) -> Option<&str> {
        self.disposition.as_deref()
    }

    /// Returns the whole part, headers included.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Returns the part content after the blank line.
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

impl fmt::Debug for FormPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormPart")
            .field("headers", &self.headers)
            .field("data_len", &self.data.len())
            .finish_non_exhaustive()
    }
}

/// Reads the request body of `exchange` as a multipart form.
///
/// Content type and declared length are checked before any body byte is read.
pub async fn read_multipart(exchange: &mut Exchange<'_>) -> Result<Vec<FormPart>, FormError> {
    let content_type = exchange.request_header(CONTENT_TYPE).unwrap_or_default().to_owned();
    let content_length = exchange.body_length();
    form_delimiter(&content_type, content_length)?;

    let mut body = exchange.request_body().await.map_err(HttpError::from)?;
    parse_multipart(&content_type, content_length, &mut body).await
}

/// Parses a multipart form of `content_length` bytes from `reader`.
///
/// # Errors
///
/// Returns [`FormError`] when:
/// - `content_type` is not `multipart/form-data` or has no boundary
/// - `content_length` exceeds [`MAX_MULTIPART_SIZE`]
/// - a part has no blank line between its headers and its data
/// - the buffer fills up while `reader` still has data
pub async fn parse_multipart<R>(content_type: &str, content_length: u64, reader: &mut R) -> Result<Vec<FormPart>, FormError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let delimiter = form_delimiter(content_type, content_length)?;
    let capacity = usize::try_from(content_length).map_err(|_| FormError::TooLarge { length: content_length, max: MAX_MULTIPART_SIZE })?;

    let mut buf = BytesMut::with_capacity(capacity);
    let mut ranges = Vec::new();

    let mut start = read_until(reader, &mut buf, capacity, &delimiter).await?;
    while let Some(offset) = start {
        if !read_count(reader, &mut buf, capacity, 2).await? {
            break;
        }
        let Some(end) = read_until(reader, &mut buf, capacity, &delimiter).await? else {
            break;
        };

        let part_start = offset + 2;
        let part_end = end - delimiter.len() - 2;
        if part_end < part_start {
            return Err(FormError::MalformedPart);
        }
        ranges.push((part_start, part_end));
        start = Some(end);
    }

    let form = buf.freeze();
    let parts = ranges.into_iter().map(|(start, end)| FormPart::new(&form, start, end)).collect::<Result<Vec<_>, _>>()?;
    debug!(parts = parts.len(), size = form.len(), "parsed multipart form");
    Ok(parts)
}

fn form_delimiter(content_type: &str, content_length: u64) -> Result<Vec<u8>, FormError> {
    let mime = content_type
        .parse::<Mime>()
        .ok()
        .filter(|mime| mime.essence_str() == MULTIPART_FORM_DATA)
        .ok_or_else(|| FormError::unsupported_content_type(MULTIPART_FORM_DATA, content_type))?;

    if content_length > MAX_MULTIPART_SIZE {
        return Err(FormError::TooLarge { length: content_length, max: MAX_MULTIPART_SIZE });
    }

    let boundary = mime.get_param(mime::BOUNDARY).ok_or(FormError::MissingBoundary)?;
    let mut delimiter = b"--".to_vec();
    delimiter.extend_from_slice(boundary.as_str().as_bytes());
    Ok(delimiter)
}

/// Appends bytes from `reader` until `buf` ends with `delimiter`.
///
/// Returns the buffer length at the match, or `None` when the reader ends first.
async fn read_until<R>(reader: &mut R, buf: &mut BytesMut, capacity: usize, delimiter: &[u8]) -> Result<Option<usize>, FormError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(None);
        }
        if buf.len() >= capacity {
            return Err(FormError::BufferOverflow);
        }

        let mut consumed = 0;
        let mut found = false;
        for &byte in available {
            if buf.len() >= capacity {
                break;
            }
            buf.put_u8(byte);
            consumed += 1;
            if buf.ends_with(delimiter) {
                found = true;
                break;
            }
        }
        reader.consume(consumed);

        if found {
            return Ok(Some(buf.len()));
        }
    }
}

/// Appends exactly `count` bytes; `false` when the reader ends first.
async fn read_count<R>(reader: &mut R, buf: &mut BytesMut, capacity: usize, mut count: usize) -> Result<bool, FormError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    while count > 0 {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(false);
        }
        if buf.len() >= capacity {
            return Err(FormError::BufferOverflow);
        }

        let n = available.len().min(count).min(capacity - buf.len());
        buf.put_slice(&available[..n]);
        reader.consume(n);
        count -= n;
    }
    Ok(true)
}
