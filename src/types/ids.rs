//! Newtype wrappers for identifiers.
//!
//! These keep spool job ids and Rundeck execution ids from being mixed up
//! with each other or with arbitrary strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a job in the spool. Ids increase monotonically per queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Returns the id that follows this one.
    pub fn next(self) -> JobId {
        JobId(self.0 + 1)
    }

    /// File stem used for this job in the spool (zero padded so that
    /// lexical and numeric ordering agree).
    pub fn file_stem(&self) -> String {
        format!("{:020}", self.0)
    }

    /// Parses a spool file stem back into a job id.
    pub fn from_file_stem(stem: &str) -> Option<JobId> {
        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse().ok().map(JobId)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of a Rundeck execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn new(s: impl Into<String>) -> Self {
        ExecutionId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
