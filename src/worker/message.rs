//! Messages sent to the queue worker.

use crate::types::JobId;

/// Messages that can be sent to the queue worker.
///
/// The worker receives these via `tokio::sync::mpsc`. Jobs themselves live in
/// the spool; a message only tells the worker to look.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    /// A job was just spooled.
    JobQueued(JobId),

    /// Finish the current job and exit the event loop.
    Shutdown,
}
