//! Prometheus metrics exposition
//!
//! HTTP-level metrics recorded here:
//!
//! - `oauth_http_requests_total` (counter): labels `route`, `status`
//! - `oauth_http_request_duration_seconds` (histogram): label `route`
//!
//! Credential lifecycle counters (`oauth_exchanges_total` and friends) are
//! emitted by the broker crate and land in the same recorder.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "oauth_http_request_duration_seconds";

/// Bucket boundaries from 1ms to 5s. Handlers touch only in-memory state
/// (and at most one small file write on registration).
const DURATION_BUCKETS: &[f64] = &[0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Must run before anything emits a metric, otherwise early samples go to
/// the no-op recorder.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a completed HTTP request.
pub fn record_request(route: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "oauth_http_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(DURATION_METRIC, "route" => route.to_string()).record(duration_secs);
}

/// Middleware that times every request and records it by matched route.
///
/// Unmatched paths are grouped under `unmatched` to keep label cardinality
/// bounded.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    record_request(
        &route,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}
