//! GitLab push webhooks.
//!
//! This module provides:
//! - Payload parsing (the subset of a push event the deployer reads)
//! - Classification of a push into a create, modify or delete action

pub mod classify;
pub mod payload;

pub use classify::{Rejection, classify};
pub use payload::{RawRepository, WebhookPayload, parse_payload};
