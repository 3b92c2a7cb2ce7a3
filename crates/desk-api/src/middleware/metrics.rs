//! # Prometheus Metrics
//!
//! HTTP metrics are recorded through the `metrics` facade and rendered by
//! the Prometheus recorder installed at startup. When no recorder is
//! installed the macros are no-ops, so the middleware is safe in tests.
//!
//! Domain gauges (open incidents, active sprints, pending leave) are set on
//! each `/metrics` scrape; see `render_metrics` in `lib.rs`.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

pub const REQUESTS_TOTAL: &str = "desk_http_requests_total";
pub const REQUEST_DURATION: &str = "desk_http_request_duration_seconds";
pub const ERRORS_TOTAL: &str = "desk_http_errors_total";

const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Install the global Prometheus recorder and return the handle used to
/// render the scrape output. Call once per process.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), DURATION_BUCKETS)?
        .install_recorder()
}

/// Replace UUID path segments with `{id}` to bound label cardinality.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if uuid::Uuid::try_parse(segment).is_ok() {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Middleware that records request count, latency and error count.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let elapsed = start.elapsed().as_secs_f64();
    metrics::counter!(
        REQUESTS_TOTAL,
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    metrics::histogram!(REQUEST_DURATION, "method" => method.clone(), "path" => path.clone())
        .record(elapsed);
    if status.is_client_error() || status.is_server_error() {
        metrics::counter!(ERRORS_TOTAL, "method" => method, "path" => path).increment(1);
    }

    response
}
