//! Wire protocol between a simpleperf client and server.
//!
//! The protocol has no message framing. The client writes payload chunks of
//! zero bytes, then the [`SENTINEL`] as its last write. The server scans the
//! byte stream for the sentinel, replies with [`ACKNOWLEDGEMENT`] and closes
//! the connection.
//!
//! # Protocol Flow
//!
//! 1. Client connects
//! 2. Client writes `BUFFER_SIZE` byte chunks until its stop condition
//! 3. Client writes `BYE`
//! 4. Server replies `ACK: BYE` and closes
//! 5. Client reads the acknowledgement and reports its summary

use crate::{Error, Result};
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of each payload write and each server read.
pub const BUFFER_SIZE: usize = 1000;

/// End-of-stream marker written by the client.
pub const SENTINEL: &[u8] = b"BYE";

/// Reply the server sends once it has seen the sentinel.
pub const ACKNOWLEDGEMENT: &[u8] = b"ACK: BYE";

/// Returns the offset of the first sentinel in `haystack`.
pub fn find_sentinel(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(SENTINEL.len())
        .position(|window| window == SENTINEL)
}

/// Incremental sentinel search over a byte stream.
///
/// Reads may split the sentinel across chunks, so the scanner keeps the last
/// few bytes of each chunk and searches them together with the next one.
/// Offsets are absolute positions in the stream.
///
/// # Examples
///
/// ```
/// use simpleperf::protocol::SentinelScanner;
///
/// let mut scanner = SentinelScanner::new();
/// assert_eq!(scanner.feed(b"\0\0\0B"), None);
/// assert_eq!(scanner.feed(b"YE"), Some(3));
/// ```
#[derive(Debug, Default)]
pub struct SentinelScanner {
    tail: Vec<u8>,
    consumed: u64,
}

impl SentinelScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next chunk of the stream.
    ///
    /// Returns the stream offset at which the sentinel starts, if it has
    /// now been seen.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<u64> {
        let base = self.consumed - self.tail.len() as u64;
        let mut window = std::mem::take(&mut self.tail);
        window.extend_from_slice(chunk);
        self.consumed += chunk.len() as u64;

        if let Some(pos) = find_sentinel(&window) {
            return Some(base + pos as u64);
        }

        let keep = window.len().min(SENTINEL.len() - 1);
        window.drain(..window.len() - keep);
        self.tail = window;
        None
    }

    /// Total bytes fed so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }
}

/// Writes the end-of-stream sentinel.
pub async fn send_sentinel<W>(stream: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(SENTINEL).await?;
    stream.flush().await?;
    debug!("Sent end-of-stream sentinel");
    Ok(())
}

/// Waits for the server's acknowledgement of the sentinel.
///
/// Reads until as many bytes as the acknowledgement has arrived or the peer
/// closes, then requires an exact match.
///
/// # Errors
///
/// Returns [`Error::Handshake`] when the reply is missing, short or
/// different, and [`Error::Io`] on a transport failure.
pub async fn await_acknowledgement<R>(stream: &mut R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reply = Vec::with_capacity(ACKNOWLEDGEMENT.len());
    let mut buf = [0u8; BUFFER_SIZE];

    while reply.len() < ACKNOWLEDGEMENT.len() {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        reply.extend_from_slice(&buf[..n]);
    }

    if reply == ACKNOWLEDGEMENT {
        debug!("Received acknowledgement");
        Ok(())
    } else if reply.is_empty() {
        Err(Error::Handshake("connection closed before reply".to_string()))
    } else {
        Err(Error::Handshake(format!(
            "unexpected reply {:?}",
            String::from_utf8_lossy(&reply)
        )))
    }
}

/// Replies to the sentinel and closes the write side.
pub async fn acknowledge<W>(stream: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(ACKNOWLEDGEMENT).await?;
    stream.flush().await?;
    stream.shutdown().await?;
    debug!("Acknowledged end-of-stream sentinel");
    Ok(())
}
