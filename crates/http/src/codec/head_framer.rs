//! Request head framing.
//!
//! Reads raw bytes from the connection until the blank line that ends the
//! request head. The scan is streaming: the terminator is detected from a
//! rolling window of the last four bytes written, so every byte costs O(1)
//! and nothing is ever re-scanned.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::trace;

use crate::protocol::ParseError;

/// `\r\n\r\n` packed into the rolling window.
const TERMINATOR: u32 = u32::from_be_bytes(*b"\r\n\r\n");

/// Default capacity of the head buffer.
pub const DEFAULT_MAX_HEAD_SIZE: usize = 8 * 1024;

/// Outcome of a head read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadStatus {
    /// The terminator was found; holds the head length, terminator included.
    Complete(usize),
    /// The peer closed the stream before a terminator arrived.
    Closed { read: usize },
}

/// Frames request heads into a fixed-capacity buffer.
#[derive(Debug, Clone, Copy)]
pub struct HeadFramer {
    capacity: usize,
}

impl HeadFramer {
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fills `buf` from offset 0 until the last four bytes written are `CR LF CR LF`.
    ///
    /// Only the bytes up to and including the terminator are consumed from
    /// `reader`; anything after it (a request body, the next request) stays
    /// buffered for the caller.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::HeadTooLarge`] when the buffer fills before the
    /// terminator is seen, and [`ParseError::Io`] on transport failure.
    pub async fn read_head<R>(&self, reader: &mut R, buf: &mut BytesMut) -> Result<HeadStatus, ParseError>
    where
        R: AsyncBufRead + Unpin + ?Sized,
    {
        buf.clear();
        buf.reserve(self.capacity);

        let mut window: u32 = 0;
        loop {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                trace!(read = buf.len(), "stream closed before request head terminator");
                return Ok(HeadStatus::Closed { read: buf.len() });
            }

            let mut consumed = 0;
            let mut complete = false;
            for &byte in available {
                buf.put_u8(byte);
                consumed += 1;
                window = (window << 8) | u32::from(byte);
                if window == TERMINATOR {
                    complete = true;
                    break;
                }
                if buf.len() >= self.capacity {
                    break;
                }
            }
            reader.consume(consumed);

            if complete {
                return Ok(HeadStatus::Complete(buf.len()));
            }
            if buf.len() >= self.capacity {
                return Err(ParseError::head_too_large(self.capacity));
            }
        }
    }
}

impl Default for HeadFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEAD_SIZE)
    }
}
