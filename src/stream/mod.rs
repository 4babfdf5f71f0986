//! Streaming response bodies with timed forced delivery.
//!
//! This module handles:
//! - The [`FlushSink`] abstraction over buffered byte destinations
//! - [`ChunkSink`], a sink feeding a chunked axum response body
//! - [`AutoFlushWriter`], which flushes its sink on a fixed period until closed

pub mod sink;
pub mod writer;

pub use sink::{ChunkSink, FlushSink};
pub use writer::{AutoFlushWriter, StreamState};
