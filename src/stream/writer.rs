//! Response writer with a periodic, cancellable background flush.
//!
//! [`AutoFlushWriter`] forwards writes straight to its sink and owns a single
//! tokio task that force-flushes the sink every `period`. Closing the writer
//! signals that task, which performs one final flush and exits; `close`
//! returns only once the task has been joined.
//!
//! ```text
//!   Open ──tick──▶ Open
//!     │
//!   close()
//!     ▼
//!   Closing ──final flush──▶ Closed
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, trace, warn};

use super::sink::FlushSink;
use crate::error::StreamError;
use crate::metrics;

/// Lifecycle of an [`AutoFlushWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Background task running, periodic flushes active.
    Open,
    /// Shutdown requested, final flush pending.
    Closing,
    /// Terminal: the task has flushed for the last time.
    Closed,
}

impl StreamState {
    const fn as_u8(self) -> u8 {
        match self {
            StreamState::Open => 0,
            StreamState::Closing => 1,
            StreamState::Closed => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => StreamState::Open,
            1 => StreamState::Closing,
            _ => StreamState::Closed,
        }
    }
}

/// State shared between the writer and its flush task.
struct Inner<S> {
    sink: S,
    state: AtomicU8,
    flush_failures: AtomicU64,
    last_flush_error: Mutex<Option<String>>,
}

impl<S: FlushSink> Inner<S> {
    fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: StreamState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Flush failures are recorded, never propagated.
    async fn flush(&self, kind: &'static str) {
        metrics::inc_stream_flushes(kind);
        match self.sink.flush().await {
            Ok(()) => trace!(kind, "forced flush"),
            Err(e) => {
                warn!(error = %e, kind, "forced flush failed");
                metrics::inc_stream_flush_failures();
                self.flush_failures.fetch_add(1, Ordering::SeqCst);
                *self
                    .last_flush_error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(e.to_string());
            }
        }
    }
}

/// Writer that force-flushes its sink every `period` until closed.
pub struct AutoFlushWriter<S: FlushSink> {
    inner: Arc<Inner<S>>,
    period: Duration,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    task: Shared<BoxFuture<'static, ()>>,
}

impl<S: FlushSink> AutoFlushWriter<S> {
    /// Wrap `sink` and start the background flush task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(sink: S, period: Duration) -> Result<Self, StreamError> {
        if period.is_zero() {
            return Err(StreamError::ZeroPeriod);
        }

        let inner = Arc::new(Inner {
            sink,
            state: AtomicU8::new(StreamState::Open.as_u8()),
            flush_failures: AtomicU64::new(0),
            last_flush_error: Mutex::new(None),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(flush_loop(Arc::clone(&inner), period, shutdown_rx));
        let task = handle
            .map(|joined| {
                if let Err(e) = joined {
                    error!(error = %e, "auto-flush task terminated abnormally");
                }
            })
            .boxed()
            .shared();

        debug!(period_ms = period.as_millis() as u64, "auto-flush writer started");

        Ok(Self {
            inner,
            period,
            shutdown: Mutex::new(Some(shutdown_tx)),
            task,
        })
    }

    /// Forward `buf` to the sink. Never flushes.
    pub fn write(&self, buf: &[u8]) -> Result<usize, StreamError> {
        if self.inner.state() == StreamState::Closed {
            return Err(StreamError::Closed);
        }
        self.inner.sink.write(buf).map_err(StreamError::SinkWrite)
    }

    /// Write the whole of `buf`, retrying short writes.
    pub fn write_all(&self, mut buf: &[u8]) -> Result<(), StreamError> {
        while !buf.is_empty() {
            match self.write(buf)? {
                0 => {
                    return Err(StreamError::SinkWrite(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "sink accepted zero bytes",
                    )))
                }
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }

    /// Write the whole of `buf`, waiting a period whenever the sink is full.
    ///
    /// Ends early on any other sink error, including a client that went away
    /// or stopped reading.
    pub async fn write_all_paced(&self, mut buf: &[u8]) -> Result<(), StreamError> {
        while !buf.is_empty() {
            match self.write(buf) {
                Ok(0) => {
                    return Err(StreamError::SinkWrite(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "sink accepted zero bytes",
                    )))
                }
                Ok(n) => buf = &buf[n..],
                Err(StreamError::SinkWrite(e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    trace!("sink full, waiting for the next flush");
                    time::sleep(self.period).await;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Stop the background task after one final flush.
    ///
    /// Waits until the task has exited. Safe to call repeatedly or
    /// concurrently; only the first call signals, the rest wait on the same
    /// join.
    pub async fn close(&self) {
        let first = self
            .inner
            .state
            .compare_exchange(
                StreamState::Open.as_u8(),
                StreamState::Closing.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();

        if first {
            let sender = self
                .shutdown
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(tx) = sender {
                // Receiver only goes away once the task has already exited.
                let _ = tx.send(());
            }
        }

        self.task.clone().await;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.inner.state()
    }

    /// Flush period fixed at construction.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of forced flushes that returned an error.
    pub fn flush_failures(&self) -> u64 {
        self.inner.flush_failures.load(Ordering::SeqCst)
    }

    /// Message of the most recent flush failure, if any.
    pub fn last_flush_error(&self) -> Option<String> {
        self.inner
            .last_flush_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<S: FlushSink> fmt::Debug for AutoFlushWriter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoFlushWriter")
            .field("period", &self.period)
            .field("state", &self.state())
            .field("flush_failures", &self.flush_failures())
            .finish()
    }
}

/// Marks the stream `Closed` however the flush task ends, including a panic
/// inside the sink.
struct ClosedOnExit<'a, S: FlushSink>(&'a Inner<S>);

impl<S: FlushSink> Drop for ClosedOnExit<'_, S> {
    fn drop(&mut self) {
        self.0.set_state(StreamState::Closed);
    }
}

/// Background task: flush on every tick until the shutdown signal fires.
///
/// A dropped sender counts as a shutdown signal, so a writer dropped without
/// `close` still gets its final flush and the task still exits.
async fn flush_loop<S: FlushSink>(
    inner: Arc<Inner<S>>,
    period: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let _closed = ClosedOnExit(&inner);
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                inner.set_state(StreamState::Closing);
                inner.flush("final").await;
                debug!("auto-flush writer closed");
                return;
            }
            _ = ticker.tick() => {
                inner.flush("periodic").await;
            }
        }
    }
}
