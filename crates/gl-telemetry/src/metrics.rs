//! Metrics for admission control and optimistic updates.
//!
//! Everything goes through the `metrics` facade; without an installed
//! recorder the helpers are no-ops.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::TelemetryError;

pub const ADMISSION_TOTAL: &str = "greenlight_admission_total";
pub const LIMITER_CLIENTS: &str = "greenlight_limiter_clients";
pub const LIMITER_EVICTED_TOTAL: &str = "greenlight_limiter_evicted_total";
pub const UPDATES_TOTAL: &str = "greenlight_updates_total";
pub const UPDATE_DURATION_SECONDS: &str = "greenlight_update_duration_seconds";

static METRICS_DESCRIBED: OnceLock<()> = OnceLock::new();

/// Register descriptions for the service's metrics with the global recorder.
pub fn describe_metrics() {
    if METRICS_DESCRIBED.set(()).is_err() {
        return;
    }

    describe_counter!(ADMISSION_TOTAL, "Admission decisions by outcome");
    describe_gauge!(LIMITER_CLIENTS, "Client keys currently tracked by the limiter");
    describe_counter!(
        LIMITER_EVICTED_TOTAL,
        "Idle client buckets removed by the sweeper"
    );
    describe_counter!(UPDATES_TOTAL, "Optimistic updates by outcome");
    describe_histogram!(
        UPDATE_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Time spent in one optimistic update attempt"
    );
}

/// Serve Prometheus metrics on `0.0.0.0:port`.
///
/// # Errors
///
/// Returns `MetricsInit` if a recorder is already installed or the listener
/// cannot start.
pub fn install_prometheus_exporter(port: u16) -> Result<(), TelemetryError> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    tracing::info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Admission
// ─────────────────────────────────────────────────────────────────────────────

/// Count one admission decision (`admitted`, `rejected_global` or
/// `rejected_client`).
pub fn record_admission(decision: &'static str) {
    counter!(ADMISSION_TOTAL, "decision" => decision).increment(1);
}

/// Report how many client keys the registry currently holds.
#[allow(clippy::cast_precision_loss)]
pub fn set_limiter_clients(count: usize) {
    gauge!(LIMITER_CLIENTS).set(count as f64);
}

/// Count buckets removed by the sweeper.
pub fn record_evictions(count: u64) {
    if count > 0 {
        counter!(LIMITER_EVICTED_TOTAL).increment(count);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Updates
// ─────────────────────────────────────────────────────────────────────────────

/// Count one update outcome and record its duration.
pub fn record_update(outcome: &'static str, elapsed: Duration) {
    counter!(UPDATES_TOTAL, "outcome" => outcome).increment(1);
    histogram!(UPDATE_DURATION_SECONDS, "outcome" => outcome).record(elapsed.as_secs_f64());
}

/// Measures one update attempt.
#[derive(Debug)]
pub struct UpdateTimer {
    start: Instant,
}

impl UpdateTimer {
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record the outcome, returning the elapsed time.
    pub fn finish(self, outcome: &'static str) -> Duration {
        let elapsed = self.elapsed();
        record_update(outcome, elapsed);
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(f: impl FnOnce()) -> String {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, f);
        handle.render()
    }

    #[test]
    fn test_admission_counts_by_decision() {
        let out = render(|| {
            record_admission("admitted");
            record_admission("admitted");
            record_admission("rejected_global");
        });
        assert!(out.contains(r#"greenlight_admission_total{decision="admitted"} 2"#));
        assert!(out.contains(r#"greenlight_admission_total{decision="rejected_global"} 1"#));
    }

    #[test]
    fn test_limiter_gauge_and_evictions() {
        let out = render(|| {
            set_limiter_clients(7);
            set_limiter_clients(3);
            record_evictions(0);
            record_evictions(4);
        });
        assert!(out.contains("greenlight_limiter_clients 3"));
        assert!(out.contains("greenlight_limiter_evicted_total 4"));
    }

    #[test]
    fn test_update_timer_records_outcome() {
        let out = render(|| {
            let elapsed = UpdateTimer::start().finish("conflict");
            assert!(elapsed < Duration::from_secs(5));
        });
        assert!(out.contains(r#"greenlight_updates_total{outcome="conflict"} 1"#));
        assert!(out.contains(r#"greenlight_update_duration_seconds_count{outcome="conflict"} 1"#));
    }

    #[test]
    fn test_helpers_without_recorder_are_noops() {
        record_admission("admitted");
        record_update("success", Duration::from_millis(3));
        describe_metrics();
        describe_metrics();
    }
}
