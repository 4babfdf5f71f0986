//! Prometheus metrics for the gate, the auto-flush streams and command runs.
//!
//! All recording goes through the `metrics` facade; without an installed
//! recorder the calls are no-ops, which keeps tests free of global state.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{debug, info};

use crate::error::GateRejection;

// === Metric Name Constants ===

/// Admitted requests counter metric name.
pub const METRIC_GATE_ADMITTED: &str = "gate_admitted_total";
/// Rejected requests counter metric name (labelled by reason).
pub const METRIC_GATE_REJECTED: &str = "gate_rejected_total";
/// Token validation latency metric name.
pub const METRIC_VALIDATOR_LATENCY: &str = "validator_latency_ms";
/// Forced flushes counter metric name (labelled by kind).
pub const METRIC_STREAM_FLUSHES: &str = "stream_flushes_total";
/// Failed flushes counter metric name.
pub const METRIC_STREAM_FLUSH_FAILURES: &str = "stream_flush_failures_total";
/// Command duration metric name.
pub const METRIC_COMMAND_DURATION: &str = "command_duration_ms";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_counter!(METRIC_GATE_ADMITTED, "Total number of admitted requests");
    describe_counter!(
        METRIC_GATE_REJECTED,
        "Total number of rejected requests by reason"
    );
    describe_histogram!(
        METRIC_VALIDATOR_LATENCY,
        "Token validation latency in milliseconds"
    );
    describe_counter!(
        METRIC_STREAM_FLUSHES,
        "Total number of forced flushes, periodic or final"
    );
    describe_counter!(
        METRIC_STREAM_FLUSH_FAILURES,
        "Total number of forced flushes that failed"
    );
    describe_histogram!(
        METRIC_COMMAND_DURATION,
        "Wall-clock duration of streamed commands in milliseconds"
    );

    debug!("Metrics initialized");
}

/// Install the Prometheus exporter listening on `addr`.
pub fn install_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Increment admitted requests counter.
pub fn inc_gate_admitted() {
    counter!(METRIC_GATE_ADMITTED).increment(1);
}

/// Increment rejected requests counter.
pub fn inc_gate_rejected(reason: GateRejection) {
    counter!(METRIC_GATE_REJECTED, "reason" => reason.as_ref().to_string()).increment(1);
}

/// Increment flush counter; `kind` is `periodic` or `final`.
pub fn inc_stream_flushes(kind: &'static str) {
    counter!(METRIC_STREAM_FLUSHES, "kind" => kind).increment(1);
}

/// Increment failed flush counter.
pub fn inc_stream_flush_failures() {
    counter!(METRIC_STREAM_FLUSH_FAILURES).increment(1);
}

/// Record how long a streamed command ran.
pub fn record_command_duration(start: Instant, action: &'static str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_COMMAND_DURATION, "action" => action).record(latency_ms);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.metric_name).record(latency_ms);
    }
}

/// Create a latency timer for token validation.
pub fn timer_validator() -> LatencyTimer {
    LatencyTimer::new(METRIC_VALIDATOR_LATENCY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn latency_timer_measures_time() {
        let timer = LatencyTimer::new("test_metric");
        sleep(Duration::from_millis(10));
        let elapsed = timer.elapsed_ms();
        assert!(elapsed >= 9.0);
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        inc_gate_admitted();
        inc_gate_rejected(GateRejection::InvalidToken);
        inc_stream_flushes("periodic");
        inc_stream_flush_failures();
    }
}
