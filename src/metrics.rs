//! Prometheus metrics for the relay.
//!
//! Call sites use the free functions below; the recorder is installed once
//! per process and shared by every router built afterwards.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::warn;

const REQUESTS_TOTAL: &str = "relay_requests_total";
const ORIGIN_ERRORS_TOTAL: &str = "relay_origin_errors_total";
const MANIFESTS_REWRITTEN_TOTAL: &str = "relay_manifests_rewritten_total";
const REQUEST_DURATION: &str = "relay_request_duration_seconds";

/// Segment downloads can run long, so the upper buckets are generous
const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the global Prometheus recorder, or return the one already installed.
///
/// Returns `None` if another recorder owns the process, in which case
/// `/metrics` is not served.
pub fn install_recorder() -> Option<PrometheusHandle> {
    HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), DURATION_BUCKETS)
                .and_then(|builder| builder.install_recorder())
                .inspect_err(|e| warn!("Prometheus recorder not installed: {}", e))
                .ok()
        })
        .clone()
}

pub fn record_request(endpoint: &'static str, status: u16) {
    counter!(REQUESTS_TOTAL, "endpoint" => endpoint, "status" => status.to_string()).increment(1);
}

pub fn record_duration(endpoint: &'static str, start: Instant) {
    histogram!(REQUEST_DURATION, "endpoint" => endpoint).record(start.elapsed().as_secs_f64());
}

pub fn record_origin_error() {
    counter!(ORIGIN_ERRORS_TOTAL).increment(1);
}

pub fn record_manifest_rewritten() {
    counter!(MANIFESTS_REWRITTEN_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_is_installed_once() {
        let first = install_recorder();
        let second = install_recorder();
        assert_eq!(first.is_some(), second.is_some());
    }

    #[test]
    fn recorded_counters_render() {
        let Some(handle) = install_recorder() else {
            return;
        };
        record_request("proxy", 200);
        record_origin_error();
        record_manifest_rewritten();

        let rendered = handle.render();
        assert!(rendered.contains(REQUESTS_TOTAL));
        assert!(rendered.contains(ORIGIN_ERRORS_TOTAL));
        assert!(rendered.contains(MANIFESTS_REWRITTEN_TOTAL));
    }
}
