//! Durable job queue for classified branch events.
//!
//! The HTTP front end enqueues one job per accepted webhook; the worker claims
//! jobs one at a time, oldest first. Records are plain JSON files so that an
//! operator can inspect (or hand-edit) the queue.
//!
//! # Crash Safety
//!
//! - Records are written atomically (temp file + rename + fsync + dir fsync)
//! - Marker files are created before the state they announce is acted upon
//! - On startup, jobs marked as processing are failed as interrupted

pub mod fsync;
pub mod job;
pub mod queue;

pub use job::{FailedJob, FailureRecord, JobData, JobRecord};
pub use queue::{
    FAILED_PURGE_BATCH, FAILED_RETENTION_LIMIT, INTERRUPTED_ERROR, JobSpool, SpoolCounts,
    SpoolError,
};
