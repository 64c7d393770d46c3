//! GitLab webhook endpoint.
//!
//! Accepts push events, classifies them, and spools one job per accepted
//! event before answering. The deployment itself happens asynchronously in
//! the queue worker.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use super::AppState;
use crate::spool::{JobData, SpoolError};
use crate::webhooks::{Rejection, classify, parse_payload};
use crate::worker::WorkerMessage;

/// Header carrying the secret token configured on the GitLab webhook.
const HEADER_TOKEN: &str = "x-gitlab-token";

/// Errors that can occur when processing a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Missing or wrong `X-Gitlab-Token`.
    #[error("invalid webhook token")]
    InvalidToken,

    /// The event is not something the deployer acts on.
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// Spool error.
    #[error("spool error: {0}")]
    Spool(#[from] SpoolError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::InvalidToken => StatusCode::UNAUTHORIZED,
            WebhookError::Rejected(_) => StatusCode::BAD_REQUEST,
            WebhookError::Spool(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}

/// Webhook handler.
///
/// # Response
///
/// - 200 OK: job spooled
/// - 400 Bad Request: payload missing, malformed, or not a handled event
/// - 401 Unauthorized: token check enabled and failed
/// - 500 Internal Server Error: spool failure
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    if let Some(expected) = app_state.gitlab_token() {
        let provided = headers.get(HEADER_TOKEN).map(|v| v.as_bytes());
        if !provided.is_some_and(|p| token_matches(p, expected.as_bytes())) {
            warn!("rejected webhook with invalid token");
            return Err(WebhookError::InvalidToken);
        }
    }

    let event = parse_payload(&body)
        .and_then(|payload| classify(Some(&payload), app_state.puppetfile_url()))
        .inspect_err(|rejection| info!(reason = %rejection, "webhook rejected"))?;

    debug!(
        module = %event.module_name,
        branch = %event.branch,
        action = %event.action,
        "webhook classified"
    );

    let job = app_state
        .spool()
        .enqueue(JobData::from(&event))
        .inspect_err(|e| warn!(error = %e, "failed to spool job"))?;

    info!(
        job = %job.id,
        job_type = %job.data.job_type,
        branch = %event.branch,
        module = %event.module_name,
        "job queued"
    );

    match app_state.worker_tx().try_send(WorkerMessage::JobQueued(job.id)) {
        Ok(()) => {}
        // The worker's periodic rescan picks the job up.
        Err(TrySendError::Full(_)) => debug!(job = %job.id, "worker channel full"),
        Err(TrySendError::Closed(_)) => warn!(job = %job.id, "worker is not running"),
    }

    Ok((StatusCode::OK, "OK"))
}

/// Compares two tokens in time independent of where they differ.
fn token_matches(provided: &[u8], expected: &[u8]) -> bool {
    provided.len() == expected.len()
        && provided
            .iter()
            .zip(expected)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
