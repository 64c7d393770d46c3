//! Background processing of spooled jobs.
//!
//! A single worker consumes the queue serially: one job at a time, oldest
//! first, each run to completion before the next is claimed.
//!
//! # Module Structure
//!
//! - [`message`]: Worker message types for async communication
//! - [`poll`]: Polling fallback configuration
//! - [`worker`]: The event loop and job processing

mod message;
mod poll;
#[allow(clippy::module_inception)]
mod worker;

pub use message::WorkerMessage;
pub use poll::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_SPOOL_POLL_SECS, PollConfig};
pub use worker::{QueueWorker, Result, WorkerError};
