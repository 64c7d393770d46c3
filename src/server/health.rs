//! Health check endpoint for liveness probes.
//!
//! Returns 200 with the queue's job counts while the spool directory is
//! readable, 503 otherwise.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use super::AppState;

/// Health check handler.
///
/// # Example
///
/// ```ignore
/// GET /health HTTP/1.1
///
/// HTTP/1.1 200 OK
/// Content-Type: application/json
///
/// {"status":"ok","queue":"r10k","pending":0,"processing":1,"failed":2}
/// ```
pub async fn health_handler(State(app_state): State<AppState>) -> Response {
    let spool = app_state.spool();
    match spool.counts() {
        Ok(counts) => Json(json!({
            "status": "ok",
            "queue": spool.queue_name(),
            "pending": counts.pending,
            "processing": counts.processing,
            "failed": counts.failed,
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed to read spool");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
