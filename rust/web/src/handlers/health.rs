use warp::http::StatusCode;
use warp::reply::Response;

use crate::errors::ok_response;
use crate::metrics::MetricsCollector;

/// GET /health
pub async fn health() -> Response {
    ok_response(StatusCode::OK, serde_json::json!({ "status": "ok" }))
}

/// GET /stats
pub async fn stats(metrics: MetricsCollector) -> Response {
    ok_response(StatusCode::OK, metrics.snapshot())
}
