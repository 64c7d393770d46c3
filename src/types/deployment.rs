//! Deployment requests and results exchanged with the job runner.

use std::fmt;

use super::event::EventInfo;
use super::ids::ExecutionId;

/// How much of an environment has to be redeployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployKind {
    /// Redeploy every module of the environment (`r10k deploy environment`).
    FullEnvironment,
    /// Update only the module that changed (`r10k deploy module`).
    SingleModule,
}

impl DeployKind {
    /// Scoping rule shared by every action: a brand new branch, or a branch
    /// into which `production` just merged new commits, needs the whole
    /// environment redeployed.
    pub fn from_full_deployment(full_deployment_needed: bool) -> Self {
        if full_deployment_needed {
            DeployKind::FullEnvironment
        } else {
            DeployKind::SingleModule
        }
    }
}

impl fmt::Display for DeployKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployKind::FullEnvironment => f.write_str("deploy_env"),
            DeployKind::SingleModule => f.write_str("deploy_mod"),
        }
    }
}

/// A request to run a deployment job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub kind: DeployKind,
    pub branch: String,
    pub module_name: String,
    pub push_user: String,
}

impl DeploymentRequest {
    /// Builds the request for an event once the checkout step has decided the
    /// deployment scope.
    pub fn for_event(event: &EventInfo, full_deployment_needed: bool) -> Self {
        DeploymentRequest {
            kind: DeployKind::from_full_deployment(full_deployment_needed),
            branch: event.branch.clone(),
            module_name: event.module_name.clone(),
            push_user: event.push_user.clone(),
        }
    }
}

/// Status of a remote execution as reported by Rundeck.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    Aborted,
    /// Any other terminal status (`timedout`, `failed-with-retry`, ...).
    Other(String),
}

impl ExecutionStatus {
    /// Parses the status attribute of an execution.
    pub fn parse(s: &str) -> Self {
        match s {
            "running" => ExecutionStatus::Running,
            "succeeded" => ExecutionStatus::Succeeded,
            "failed" => ExecutionStatus::Failed,
            "aborted" => ExecutionStatus::Aborted,
            other => ExecutionStatus::Other(other.to_string()),
        }
    }

    /// Only `running` keeps the poll loop going.
    pub fn is_running(&self) -> bool {
        matches!(self, ExecutionStatus::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Succeeded)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Running => f.write_str("running"),
            ExecutionStatus::Succeeded => f.write_str("succeeded"),
            ExecutionStatus::Failed => f.write_str("failed"),
            ExecutionStatus::Aborted => f.write_str("aborted"),
            ExecutionStatus::Other(s) => f.write_str(s),
        }
    }
}

/// Terminal result of a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentResult {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
}
