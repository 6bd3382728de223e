//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

use mirage_models::CompressionReport;

/// Install the global Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "mirage_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "mirage_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "mirage_http_requests_in_flight";

    // Upload / processing metrics
    pub const UPLOADS_TOTAL: &str = "mirage_uploads_total";
    pub const UPLOAD_BYTES_TOTAL: &str = "mirage_upload_bytes_total";
    pub const PROCESSED_BYTES_TOTAL: &str = "mirage_processed_bytes_total";
    pub const PROCESSING_DURATION_SECONDS: &str = "mirage_processing_duration_seconds";
    pub const FRAMES_TOTAL: &str = "mirage_frames_total";
    pub const JOBS_IN_FLIGHT: &str = "mirage_jobs_in_flight";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "mirage_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record an upload outcome ("success", "rejected", "failed").
pub fn record_upload(outcome: &str, bytes: u64) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::UPLOADS_TOTAL, &labels).increment(1);
    counter!(names::UPLOAD_BYTES_TOTAL).increment(bytes);
}

/// Record a finished compression.
pub fn record_compression(report: &CompressionReport, output_bytes: u64) {
    histogram!(names::PROCESSING_DURATION_SECONDS).record(report.elapsed_ms as f64 / 1000.0);
    counter!(names::PROCESSED_BYTES_TOTAL).increment(output_bytes);
    counter!(names::FRAMES_TOTAL, "kind" => "idle").increment(report.frames_idle);
    counter!(names::FRAMES_TOTAL, "kind" => "degraded").increment(report.frames_degraded);
    counter!(names::FRAMES_TOTAL, "kind" => "all").increment(report.frames_total);
}

/// Track compressions currently holding a job permit.
pub fn set_jobs_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

static FILENAME_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/api/(video|processed)/[^/]+").expect("valid filename segment regex")
});

/// Sanitize path for metrics labels (collapse filenames).
fn sanitize_path(path: &str) -> String {
    FILENAME_SEGMENT
        .replace(path, "/api/${1}/:filename")
        .to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/video/lobby_cam.mp4"),
            "/api/video/:filename"
        );
        assert_eq!(
            sanitize_path("/api/processed/processed_lobby_cam.mp4/stats"),
            "/api/processed/:filename/stats"
        );
        assert_eq!(sanitize_path("/api/upload"), "/api/upload");
        assert_eq!(sanitize_path("/health"), "/health");
    }
}
