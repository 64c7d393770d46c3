//! Deployment through Rundeck.
//!
//! A deployment posts a run request for one of two jobs (whole environment
//! or single module), then polls the execution until it leaves the `running`
//! state. Only `succeeded` counts as success.

pub mod client;
pub mod error;
pub mod xml;

use std::future::Future;

use crate::types::{DeploymentRequest, DeploymentResult};

pub use client::{DEFAULT_POLL_INTERVAL, RundeckClient, RundeckConfig};
pub use error::RundeckError;

/// Runs a deployment to completion.
///
/// The action runners only see this trait, so tests can substitute a
/// recording implementation for the HTTP client.
pub trait DeploymentTrigger {
    /// Triggers the deployment and waits for its terminal status.
    fn deploy(
        &self,
        request: &DeploymentRequest,
    ) -> impl Future<Output = Result<DeploymentResult, RundeckError>> + Send;
}
