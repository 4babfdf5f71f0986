//! Authenticated HTTP front end for project status and deployments.
//!
//! Every request passes an authentication gate that resolves its bearer token
//! to an identity. Admitted requests for status, containers or deployments run
//! a configured command and stream its output back while it runs:
//!
//! ```text
//! request ─▶ Gate::admit ─┬─ reject ─▶ 401 / 303 login / 503
//!                         └─ admit  ─▶ handler ─▶ AutoFlushWriter ─▶ chunked body
//!                                                    ▲
//!                                        flush task every period
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`auth`]: Token extraction, validation and the admission gate
//! - [`stream`]: Auto-flushing response writer
//! - [`runner`]: Shell command execution feeding the stream
//! - [`api`]: HTTP routes and handlers
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod runner;
pub mod stream;
pub mod utils;

pub use config::Config;
pub use error::{AppError, Result};
