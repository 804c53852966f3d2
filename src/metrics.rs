//! Prometheus metrics.
//!
//! Recording goes through the `metrics` facade; [`install`] registers the
//! Prometheus recorder once per process and hands out its render handle.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::warn;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder (idempotent) and return its handle.
pub fn install() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if let Err(e) = metrics::set_global_recorder(recorder) {
                // Another recorder owns the facade; rendering will be empty
                warn!("Metrics recorder already installed: {}", e);
            }
            handle
        })
        .clone()
}

/// Count a handled request by endpoint kind and response status.
pub fn record_request(kind: &'static str, status: u16) {
    metrics::counter!(
        "veilstream_requests_total",
        "kind" => kind,
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record request latency for an endpoint kind.
pub fn record_duration(kind: &'static str, start: Instant) {
    metrics::histogram!("veilstream_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

/// Count one retry of an upstream fetch.
pub fn record_upstream_retry() {
    metrics::counter!("veilstream_upstream_retries_total").increment(1);
}

/// Count an upstream fetch that failed after exhausting its retries.
pub fn record_upstream_error() {
    metrics::counter!("veilstream_upstream_errors_total").increment(1);
}

/// Count a binary relay that ended before the upstream body was exhausted.
pub fn record_relay_cancelled(reason: &'static str) {
    metrics::counter!("veilstream_relay_cancelled_total", "reason" => reason).increment(1);
}
