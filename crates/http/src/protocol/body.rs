//! Request and response body types.
//!
//! - [`BodyReader`]: a length-restricted view over the connection input that
//!   never yields more than the declared `Content-Length`
//! - [`ResponseBody`]: what the exchange writes after the response head

use std::cmp;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};

/// Upper bound of bytes handed out by a single read.
pub(crate) const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads the request body from the connection, stopping at the declared length.
///
/// The remaining byte count lives on the owning exchange, so bytes read through
/// one `BodyReader` are never read again by the connection when it drains the
/// unread rest of the body. A peer that closes before the declared length is
/// reached surfaces as [`io::ErrorKind::UnexpectedEof`].
pub struct BodyReader<'a> {
    inner: &'a mut (dyn AsyncBufRead + Send + Unpin),
    remaining: &'a mut u64,
}

impl<'a> BodyReader<'a> {
    pub(crate) fn new(inner: &'a mut (dyn AsyncBufRead + Send + Unpin), remaining: &'a mut u64) -> Self {
        Self { inner, remaining }
    }

    /// Returns the number of body bytes not read yet.
    pub fn remaining(&self) -> u64 {
        *self.remaining
    }
}

impl fmt::Debug for BodyReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyReader").field("remaining", &self.remaining).finish_non_exhaustive()
    }
}

impl AsyncRead for BodyReader<'_> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if *this.remaining == 0 || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let n = {
            let available = ready!(Pin::new(&mut *this.inner).poll_fill_buf(cx))?;
            if available.is_empty() {
                return Poll::Ready(Err(io::ErrorKind::UnexpectedEof.into()));
            }
            let n = limit(available.len(), *this.remaining).min(buf.remaining()).min(READ_CHUNK_SIZE);
            buf.put_slice(&available[..n]);
            n
        };

        Pin::new(&mut *this.inner).consume(n);
        *this.remaining -= n as u64;
        Poll::Ready(Ok(()))
    }
}

impl AsyncBufRead for BodyReader<'_> {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        let this = self.get_mut();
        if *this.remaining == 0 {
            return Poll::Ready(Ok(&[]));
        }

        let remaining = *this.remaining;
        let available = ready!(Pin::new(&mut *this.inner).poll_fill_buf(cx))?;
        if available.is_empty() {
            return Poll::Ready(Err(io::ErrorKind::UnexpectedEof.into()));
        }
        let n = limit(available.len(), remaining);
        Poll::Ready(Ok(&available[..n]))
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        let this = self.get_mut();
        let amt = limit(amt, *this.remaining);
        Pin::new(&mut *this.inner).consume(amt);
        *this.remaining -= amt as u64;
    }
}

#[inline]
fn limit(len: usize, remaining: u64) -> usize {
    cmp::min(len as u64, remaining) as usize
}

/// The body written after the response head.
///
/// Assigning a new body replaces the previous one.
#[derive(Default)]
pub enum ResponseBody {
    #[default]
    Empty,
    Bytes(Bytes),
    /// A stream copied in chunks, truncated to `length` bytes.
    Stream { reader: Box<dyn AsyncRead + Send + Unpin>, length: u64 },
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self::Empty
    }

    pub fn stream<R>(reader: R, length: u64) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::Stream { reader: Box::new(reader), length }
    }

    /// Returns the number of bytes this body writes.
    pub fn len(&self) -> u64 {
        match self {
            ResponseBody::Empty => 0,
            ResponseBody::Bytes(bytes) => bytes.len() as u64,
            ResponseBody::Stream { length, .. } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("Empty"),
            ResponseBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            ResponseBody::Stream { length, .. } => f.debug_struct("Stream").field("length", length).finish_non_exhaustive(),
        }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(value.as_bytes()))
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}
