//! The queue worker: claims spooled jobs one at a time and runs them.
//!
//! # Job Processing Flow
//!
//! 1. Claim the oldest pending job (creates its `.proc` marker)
//! 2. Rebuild the event from the record
//! 3. Run the matching workflow to completion
//! 4. Remove the job on success, or record the failure
//!
//! A job is attempted at most once. Jobs found processing when the spool is
//! opened were interrupted and are failed, never re-run.
//!
//! # Async Event Loop
//!
//! The worker runs as a tokio task whose loop handles:
//! - Nudges from the webhook handler via message channel
//! - Periodic spool rescans (fallback for dropped nudges)
//! - Graceful shutdown via cancellation token

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::actions::{ActionError, ActionOutcome, ActionRunner};
use crate::rundeck::DeploymentTrigger;
use crate::spool::{JobRecord, JobSpool, SpoolError};
use crate::types::UnknownActionType;

use super::message::WorkerMessage;
use super::poll::PollConfig;

/// `tokio::time::interval` panics on a zero period.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors that can occur during worker operations.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Spool operation failed.
    #[error("spool error: {0}")]
    Spool(#[from] SpoolError),

    /// The record's `type` is not one of the known events.
    #[error(transparent)]
    UnknownJobType(#[from] UnknownActionType),

    /// The workflow failed.
    #[error(transparent)]
    Action(#[from] ActionError),
}

/// Result type for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Serial consumer of one spool queue.
pub struct QueueWorker<D> {
    spool: Arc<JobSpool>,
    runner: ActionRunner<D>,
    poll_config: PollConfig,
}

impl<D: DeploymentTrigger + Send + Sync + 'static> QueueWorker<D> {
    pub fn new(spool: Arc<JobSpool>, runner: ActionRunner<D>, poll_config: PollConfig) -> Self {
        QueueWorker {
            spool,
            runner,
            poll_config,
        }
    }

    /// Runs one job to completion and settles it in the spool.
    ///
    /// The job's own failure is recorded in the spool and is not an error
    /// here; only spool failures are returned.
    #[instrument(skip(self, job), fields(job = %job.id, branch = %job.data.branch, module = %job.data.module_name))]
    pub async fn process_job(&self, job: JobRecord) -> Result<()> {
        match self.run_job(&job).await {
            Ok(outcome) => {
                self.spool.complete(job.id)?;
                info!(?outcome, "job completed");
            }
            Err(e) => {
                error!(error = %e, "job failed");
                let purged = self.spool.fail(job.id, &e.to_string())?;
                if purged > 0 {
                    info!(purged, "purged oldest failed jobs");
                }
            }
        }
        Ok(())
    }

    async fn run_job(&self, job: &JobRecord) -> Result<ActionOutcome> {
        let event = job.data.to_event()?;
        debug!(action = %event.action, "running job");
        Ok(self.runner.run(&event).await?)
    }

    /// Processes pending jobs until the spool is empty or shutdown is
    /// requested. Returns how many jobs were processed.
    pub async fn drain(&self, shutdown: &CancellationToken) -> Result<usize> {
        let mut processed = 0;
        while !shutdown.is_cancelled() {
            let Some(job) = self.spool.claim_next()? else {
                break;
            };
            self.process_job(job).await?;
            processed += 1;
        }
        Ok(processed)
    }

    async fn drain_logged(&self, shutdown: &CancellationToken) {
        match self.drain(shutdown).await {
            Ok(0) => trace!("no pending jobs"),
            Ok(processed) => debug!(processed, "spool drained"),
            Err(e) => error!(error = %e, "error draining spool"),
        }
    }

    // ─── Async Event Loop ─────────────────────────────────────────────────────────

    /// Runs the worker event loop until shutdown.
    ///
    /// A job in flight when shutdown is requested is finished first.
    #[instrument(skip_all, fields(queue = %self.spool.queue_name()))]
    pub async fn run(self, mut rx: mpsc::Receiver<WorkerMessage>, shutdown: CancellationToken) {
        info!("worker started");

        // Jobs spooled before startup get no nudge.
        self.drain_logged(&shutdown).await;

        let mut ticker = tokio::time::interval(self.poll_config.poll_interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown signal received, stopping worker");
                    break;
                }

                msg = rx.recv() => {
                    match msg {
                        Some(WorkerMessage::JobQueued(id)) => {
                            debug!(job = %id, "job queued");
                            self.drain_logged(&shutdown).await;
                        }
                        Some(WorkerMessage::Shutdown) => {
                            info!("shutdown message received");
                            break;
                        }
                        None => {
                            warn!("message channel closed");
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    self.drain_logged(&shutdown).await;
                }
            }
        }

        info!("worker stopped");
    }
}
