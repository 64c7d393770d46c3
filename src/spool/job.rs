//! Job records as stored in the spool.
//!
//! The payload keeps the field names the deployer has always used on its
//! queue (`pfrepo`, `reponame`, `repourl`, ...), so records stay readable by
//! operators used to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ActionType, EventInfo, JobId, UnknownActionType};

/// The event carried by a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobData {
    #[serde(rename = "pfrepo")]
    pub manifest_repo_url: String,
    #[serde(rename = "pushuser", default)]
    pub push_user: String,
    #[serde(rename = "reponame")]
    pub module_name: String,
    pub branch: String,
    #[serde(rename = "repourl")]
    pub module_repo_url: String,
    /// `createEvent`, `modifyEvent` or `deleteEvent`. Kept as a string so a
    /// record with an unknown type still loads and can be failed cleanly.
    #[serde(rename = "type")]
    pub job_type: String,
}

impl JobData {
    /// Name of the first required field that is empty, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("pfrepo", &self.manifest_repo_url),
            ("reponame", &self.module_name),
            ("branch", &self.branch),
            ("repourl", &self.module_repo_url),
            ("type", &self.job_type),
        ]
        .into_iter()
        .find(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
    }

    /// Rebuilds the classified event.
    pub fn to_event(&self) -> Result<EventInfo, UnknownActionType> {
        let action: ActionType = self.job_type.parse()?;
        Ok(EventInfo {
            manifest_repo_url: self.manifest_repo_url.clone(),
            push_user: self.push_user.clone(),
            module_name: self.module_name.clone(),
            branch: self.branch.clone(),
            module_repo_url: self.module_repo_url.clone(),
            action,
        })
    }
}

impl From<&EventInfo> for JobData {
    fn from(event: &EventInfo) -> Self {
        JobData {
            manifest_repo_url: event.manifest_repo_url.clone(),
            push_user: event.push_user.clone(),
            module_name: event.module_name.clone(),
            branch: event.branch.clone(),
            module_repo_url: event.module_repo_url.clone(),
            job_type: event.action.job_type().to_string(),
        }
    }
}

/// A spooled job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub created_at: DateTime<Utc>,
    pub data: JobData,
}

/// Failure details written next to a failed job's record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub failed_at: DateTime<Utc>,
    pub error: String,
}

/// A failed job as listed by the spool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedJob {
    pub id: JobId,
    pub failed_at: DateTime<Utc>,
    pub error: String,
}
