//! Prometheus metrics exposition
//!
//! Per-request metrics recorded by the service:
//!
//! - `pool_requests_total` (counter): labels `route`, `status`
//! - `pool_request_duration_seconds` (histogram): label `route`
//!
//! The pool counters and gauges (`pool_checkouts_total`, `pool_accounts`,
//! `pool_verifications_total`, ...) are emitted by the account-pool crate
//! through the same recorder.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Request latency buckets from 1ms to 30s. Verification requests sit at the
/// top of the range since they wait on the token endpoint and the mailbox.
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("pool_request_duration_seconds".to_string()),
        DURATION_BUCKETS,
    )
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `pool_request_duration_seconds` is configured with explicit buckets so it
/// renders as a Prometheus histogram rather than a summary.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(builder()?.install_recorder()?)
}

/// Record a completed request with its matched route and status code.
pub fn record_request(route: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "pool_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("pool_request_duration_seconds", "route" => route.to_string())
        .record(duration_secs);
}

#[cfg(test)]
pub(crate) fn isolated_recorder() -> (
    metrics_exporter_prometheus::PrometheusRecorder,
    PrometheusHandle,
) {
    let recorder = builder().unwrap().build_recorder();
    let handle = recorder.handle();
    (recorder, handle)
}
