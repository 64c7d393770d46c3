//! Rundeck API error types.
//!
//! Two families are distinguished:
//!
//! - **Remote API failures**: the API could not be reached, answered with a
//!   non-2xx status, or returned a body we can't read.
//! - **Remote job failures**: the API worked, but the triggered execution
//!   ended in a status other than `succeeded`.
//!
//! Neither is retried. A trigger is not idempotent: re-posting a run request
//! starts a second execution.

use thiserror::Error;

use crate::types::{ExecutionId, ExecutionStatus};

/// Errors from the deployment trigger.
#[derive(Debug, Error)]
pub enum RundeckError {
    /// The request could not be built from the deployment parameters.
    #[error("invalid deployment request: {0}")]
    InvalidRequest(String),

    /// The HTTP request failed before a response was received.
    ///
    /// The source has its URL stripped so the API token never ends up in
    /// logs.
    #[error("Rundeck API request failed while trying to {action}: {source}")]
    Transport {
        action: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-2xx status.
    #[error("Rundeck API returned HTTP {status} while trying to {action}")]
    UnexpectedStatus {
        action: &'static str,
        status: u16,
        body: String,
    },

    /// The response body is not the XML we expect.
    #[error("malformed Rundeck API response: {0}")]
    MalformedResponse(String),

    /// The execution finished without succeeding.
    #[error("job execution {execution_id} {status}. Check the following URL for job logs: {log_url}")]
    JobFailed {
        execution_id: ExecutionId,
        status: ExecutionStatus,
        log_url: String,
    },
}

/// Result type for Rundeck operations.
pub type Result<T> = std::result::Result<T, RundeckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_failure_message_carries_log_url() {
        let err = RundeckError::JobFailed {
            execution_id: ExecutionId::new("42"),
            status: ExecutionStatus::Failed,
            log_url: "https://rd/project/puppet/execution/show/42".to_string(),
        };

        assert_eq!(
            err.to_string(),
            "job execution 42 failed. Check the following URL for job logs: https://rd/project/puppet/execution/show/42"
        );
    }

    #[test]
    fn api_failure_message_names_the_action() {
        let err = RundeckError::UnexpectedStatus {
            action: "launch the job",
            status: 403,
            body: String::new(),
        };
        assert_eq!(
            err.to_string(),
            "Rundeck API returned HTTP 403 while trying to launch the job"
        );
    }
}
