//! Classified branch events.

use std::fmt;
use std::str::FromStr;

/// The baseline branch merged into every feature branch. Never deleted.
pub const PRODUCTION_BRANCH: &str = "production";

/// What a branch event means for the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    /// A branch was created in a module repository.
    Create,
    /// An existing branch received new commits.
    Modify,
    /// A branch was deleted.
    Delete,
}

impl ActionType {
    /// The job type string stored in spool records.
    pub fn job_type(&self) -> &'static str {
        match self {
            ActionType::Create => "createEvent",
            ActionType::Modify => "modifyEvent",
            ActionType::Delete => "deleteEvent",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.job_type())
    }
}

/// Error returned when a job type string is not one of the known events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownActionType(pub String);

impl FromStr for ActionType {
    type Err = UnknownActionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createEvent" => Ok(ActionType::Create),
            "modifyEvent" => Ok(ActionType::Modify),
            "deleteEvent" => Ok(ActionType::Delete),
            other => Err(UnknownActionType(other.to_string())),
        }
    }
}

/// A classified branch event: the unit of work placed on the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInfo {
    /// Clone URL of the manifest (Puppetfile) repository.
    pub manifest_repo_url: String,
    /// Who pushed. Forwarded to the deployment job.
    pub push_user: String,
    /// Name of the module repository that emitted the event.
    pub module_name: String,
    /// Branch name, which doubles as the environment name.
    pub branch: String,
    /// Clone URL of the module repository.
    pub module_repo_url: String,
    pub action: ActionType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_type_strings_roundtrip() {
        for action in [ActionType::Create, ActionType::Modify, ActionType::Delete] {
            assert_eq!(action.job_type().parse::<ActionType>(), Ok(action));
        }
    }

    #[test]
    fn unknown_job_type_is_rejected() {
        let err = "renameEvent".parse::<ActionType>().unwrap_err();
        assert_eq!(err, UnknownActionType("renameEvent".to_string()));
        assert_eq!(err.to_string(), "unknown event type: renameEvent");
    }
}
