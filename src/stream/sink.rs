//! Byte sinks that buffer writes and deliver them on an explicit flush.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use tokio::sync::mpsc;
use tokio::time;
use tracing::trace;

/// Destination that buffers writes and delivers them on [`FlushSink::flush`].
///
/// `write` may be called from the owning handler while a flush is running on
/// the background task, so implementations synchronise internally.
#[async_trait]
pub trait FlushSink: Send + Sync + 'static {
    /// Buffer `buf`, returning how many bytes were accepted.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Deliver everything buffered so far.
    async fn flush(&self) -> io::Result<()>;
}

/// Bytes a [`ChunkSink`] buffers before pushing back on writers.
pub const DEFAULT_MAX_BUFFERED: usize = 256 * 1024;

/// How long a flush waits for the client to make room for a chunk.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Sink feeding a chunked HTTP response body.
///
/// Writes accumulate in memory up to `max_buffered` bytes; past that, writes
/// fail with `WouldBlock` until the next flush drains the buffer. Each flush
/// sends the accumulated bytes as a single chunk to the [`Body`] returned by
/// [`ChunkSink::channel`]. A client that stops reading for longer than
/// `send_timeout` is treated as gone.
#[derive(Debug)]
pub struct ChunkSink {
    buffer: Mutex<Vec<u8>>,
    tx: mpsc::Sender<Bytes>,
    max_buffered: usize,
    send_timeout: Duration,
    stalled: AtomicBool,
}

impl ChunkSink {
    /// Create a sink and the response body it feeds.
    ///
    /// `capacity` bounds how many flushed chunks may wait for the client.
    pub fn channel(capacity: usize) -> (Self, Body) {
        let (tx, mut rx) = mpsc::channel::<Bytes>(capacity.max(1));

        let chunks = async_stream::stream! {
            while let Some(chunk) = rx.recv().await {
                yield Ok::<_, io::Error>(chunk);
            }
        };

        let sink = Self {
            buffer: Mutex::new(Vec::new()),
            tx,
            max_buffered: DEFAULT_MAX_BUFFERED,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            stalled: AtomicBool::new(false),
        };
        (sink, Body::from_stream(chunks))
    }

    /// Cap the unflushed buffer at `bytes` (at least one).
    pub fn with_max_buffered(mut self, bytes: usize) -> Self {
        self.max_buffered = bytes.max(1);
        self
    }

    /// Give up on a chunk the client has not taken within `timeout`.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Bytes written but not yet flushed.
    pub fn buffered_len(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether a flush has timed out waiting for the client.
    pub fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::SeqCst)
    }
}

fn client_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "response body receiver dropped")
}

fn client_stalled() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client stopped reading")
}

#[async_trait]
impl FlushSink for ChunkSink {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if self.is_stalled() {
            return Err(client_stalled());
        }
        if self.tx.is_closed() {
            return Err(client_gone());
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let room = self.max_buffered.saturating_sub(buffer.len());
        if room == 0 {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "sink buffer full"));
        }
        let accepted = room.min(buf.len());
        buffer.extend_from_slice(&buf[..accepted]);
        Ok(accepted)
    }

    async fn flush(&self) -> io::Result<()> {
        let chunk = {
            let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *buffer)
        };
        if chunk.is_empty() {
            return Ok(());
        }
        if self.is_stalled() {
            return Err(client_stalled());
        }

        let len = chunk.len();
        match time::timeout(self.send_timeout, self.tx.send(Bytes::from(chunk))).await {
            Ok(Ok(())) => {
                trace!(bytes = len, "chunk flushed");
                Ok(())
            }
            Ok(Err(_)) => Err(client_gone()),
            Err(_) => {
                // Chunk dropped; later bytes could only arrive out of order.
                self.stalled.store(true, Ordering::SeqCst);
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("client took no data for {:?}", self.send_timeout),
                ))
            }
        }
    }
}
