//! HTTP front end of the deployer.
//!
//! This module implements the HTTP server that:
//! - Accepts GitLab push webhooks, classifies them, and spools one job per
//!   accepted event
//! - Provides a health check reporting the queue's state
//!
//! # Endpoints
//!
//! - `POST /gitlab` - Accepts GitLab push events (returns 200 OK)
//! - `GET /health` - Returns 200 with queue counts while the spool is readable

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::spool::JobSpool;
use crate::worker::WorkerMessage;

pub mod health;
pub mod webhook;

pub use health::health_handler;
pub use webhook::{WebhookError, webhook_handler};

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Queue accepted events are spooled to.
    spool: Arc<JobSpool>,

    /// Manifest repository URL written into every job.
    puppetfile_url: String,

    /// Expected `X-Gitlab-Token` value. `None` disables the check.
    gitlab_token: Option<String>,

    /// Nudges the worker after a job is spooled.
    worker_tx: mpsc::Sender<WorkerMessage>,
}

impl AppState {
    pub fn new(
        spool: Arc<JobSpool>,
        puppetfile_url: impl Into<String>,
        gitlab_token: Option<String>,
        worker_tx: mpsc::Sender<WorkerMessage>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                spool,
                puppetfile_url: puppetfile_url.into(),
                gitlab_token,
                worker_tx,
            }),
        }
    }

    pub fn spool(&self) -> &JobSpool {
        &self.inner.spool
    }

    pub fn puppetfile_url(&self) -> &str {
        &self.inner.puppetfile_url
    }

    pub fn gitlab_token(&self) -> Option<&str> {
        self.inner.gitlab_token.as_deref()
    }

    pub fn worker_tx(&self) -> &mpsc::Sender<WorkerMessage> {
        &self.inner.worker_tx
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/gitlab", post(webhook_handler))
        .route("/health", get(health_handler))
        .fallback(not_found)
        .with_state(app_state)
}

async fn not_found() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::NOT_FOUND, "Not found")
}
