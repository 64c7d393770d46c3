//! The three branch workflows: create, modify and delete.
//!
//! Every workflow runs in two phases:
//!
//! 1. **Prepare** (blocking pool): clone the manifest repository into a fresh
//!    working copy, check out the branch, edit the Puppetfile, commit and push.
//!    The phase ends with a [`Plan`]: either a deployment to run, or an
//!    outcome that needs no deployment.
//! 2. **Deploy** (async): trigger the deployment and wait for it.
//!
//! The working copy is removed once both phases are over, whatever the
//! result.
//!
//! Deployment scope is decided the same way by every workflow: if the branch
//! is new, or merging `production` into it brought new commits, the whole
//! environment is redeployed. Otherwise only the module is.

pub mod create;
pub mod delete;
pub mod modify;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::instrument;

use crate::git::{GitConfig, GitError, ManifestRepo, WorkingCopy};
use crate::manifest::{ManifestError, Puppetfile};
use crate::rundeck::{DeploymentTrigger, RundeckError};
use crate::types::{ActionType, DeploymentRequest, DeploymentResult, EventInfo};

/// Errors that abort a workflow.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The manifest does not hold what the workflow needs.
    #[error("module {module} is not in the manifest of branch {branch}")]
    ManifestInconsistent { module: String, branch: String },

    #[error(transparent)]
    Deployment(#[from] RundeckError),

    /// The blocking phase panicked or was cancelled.
    #[error("repository task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for workflows.
pub type Result<T> = std::result::Result<T, ActionError>;

/// How a workflow ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The manifest was updated (if needed) and the deployment succeeded.
    Deployed(DeploymentResult),
    /// Delete event for a branch the manifest repository no longer has.
    BranchAlreadyGone,
    /// No other module used the branch, so the manifest branch was deleted.
    BranchDeleted,
}

/// Result of the prepare phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Deploy(DeploymentRequest),
    Done(ActionOutcome),
}

/// Settings shared by all workflows.
#[derive(Debug, Clone)]
pub struct ActionSettings {
    /// Directory under which working copies are created.
    pub workdir_base: PathBuf,
    pub git: GitConfig,
    /// Puppetfile location relative to the repository root.
    pub manifest_file: PathBuf,
}

/// Runs workflows against the manifest repository and a deployment trigger.
#[derive(Debug, Clone)]
pub struct ActionRunner<D> {
    settings: ActionSettings,
    deployer: D,
}

impl<D: DeploymentTrigger> ActionRunner<D> {
    pub fn new(settings: ActionSettings, deployer: D) -> Self {
        ActionRunner { settings, deployer }
    }

    /// Runs the workflow matching `event.action`.
    #[instrument(skip(self, event), fields(action = %event.action, branch = %event.branch, module = %event.module_name))]
    pub async fn run(&self, event: &EventInfo) -> Result<ActionOutcome> {
        let workdir = WorkingCopy::create(&self.settings.workdir_base)?;
        let result = self.run_in(event, workdir.path()).await;
        workdir.remove();
        result
    }

    async fn run_in(&self, event: &EventInfo, path: &Path) -> Result<ActionOutcome> {
        let settings = self.settings.clone();
        let job_event = event.clone();
        let path = path.to_path_buf();

        let plan = tokio::task::spawn_blocking(move || prepare(&settings, &job_event, &path))
            .await??;

        match plan {
            Plan::Done(outcome) => {
                tracing::info!(?outcome, "nothing to deploy");
                Ok(outcome)
            }
            Plan::Deploy(request) => {
                tracing::info!(kind = %request.kind, "deploying");
                let result = self.deployer.deploy(&request).await?;
                Ok(ActionOutcome::Deployed(result))
            }
        }
    }
}

/// Runs the blocking phase of the workflow matching `event.action`.
pub fn prepare(settings: &ActionSettings, event: &EventInfo, path: &Path) -> Result<Plan> {
    match event.action {
        ActionType::Create => create::prepare(settings, event, path),
        ActionType::Modify => modify::prepare(settings, event, path),
        ActionType::Delete => delete::prepare(settings, event, path),
    }
}

/// Clones the manifest repository named in the event and fetches it.
fn clone_manifest(settings: &ActionSettings, event: &EventInfo, path: &Path) -> Result<ManifestRepo> {
    let repo = ManifestRepo::clone(&event.manifest_repo_url, path, &settings.git)?;
    repo.fetch()?;
    Ok(repo)
}

/// Checks out the event's branch, creating it from `production` if it does
/// not exist yet. Returns whether a full deployment is needed.
fn checkout_branch(repo: &ManifestRepo, branch: &str) -> Result<bool> {
    if repo.branch_exists(branch)? {
        Ok(repo.checkout_existing(branch)?)
    } else {
        repo.checkout_new(branch)?;
        Ok(true)
    }
}

/// Points the event's module at `git_ref`, appending an entry when the
/// module is not in the manifest. Returns whether the text changed.
fn point_module_at(manifest: &mut Puppetfile, event: &EventInfo, git_ref: &str) -> Result<bool> {
    match manifest.locate(&event.module_name, &event.module_repo_url) {
        Some(anchor) => Ok(manifest.replace_ref(&anchor, git_ref)?),
        None => {
            tracing::info!(module = %event.module_name, "module not in manifest, appending it");
            manifest.append(&event.module_name, &event.module_repo_url, git_ref)?;
            Ok(true)
        }
    }
}

/// Writes and commits the manifest if it changed, then pushes when there is
/// anything to push.
fn publish(
    repo: &ManifestRepo,
    settings: &ActionSettings,
    manifest: &Puppetfile,
    event: &EventInfo,
    changed: bool,
    full_deployment_needed: bool,
) -> Result<()> {
    if changed {
        manifest.save(&repo.path().join(&settings.manifest_file))?;
        if repo.has_local_changes()? {
            repo.commit(&event.module_name, &event.branch)?;
        }
    }
    if changed || full_deployment_needed {
        repo.push(&event.branch)?;
    }
    tracing::debug!(
        changed,
        pushed = changed || full_deployment_needed,
        "manifest published"
    );
    Ok(())
}
