//! Shared test fixtures: a bare manifest remote and a recording deployer.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use crate::actions::ActionSettings;
use crate::git::{CommitIdentity, GitConfig, run_git_commit, run_git_stdout, run_git_sync};
use crate::rundeck::{DeploymentTrigger, RundeckError};
use crate::types::{
    ActionType, DeploymentRequest, DeploymentResult, EventInfo, ExecutionId, ExecutionStatus,
};

pub fn test_identity() -> CommitIdentity {
    CommitIdentity {
        name: "Test".to_string(),
        email: "test@test.com".to_string(),
    }
}

pub fn test_git_config() -> GitConfig {
    GitConfig {
        remote_name: "origin".to_string(),
        commit_identity: test_identity(),
    }
}

pub fn test_action_settings(workdir_base: &Path) -> ActionSettings {
    ActionSettings {
        workdir_base: workdir_base.to_path_buf(),
        git: test_git_config(),
        manifest_file: PathBuf::from("Puppetfile"),
    }
}

/// An event for `module` on `branch`, pushed by `alice`, against `remote`.
pub fn event(remote: &ManifestRemote, action: ActionType, module: &str, branch: &str) -> EventInfo {
    EventInfo {
        manifest_repo_url: remote.url().to_string(),
        push_user: "alice".to_string(),
        module_name: module.to_string(),
        branch: branch.to_string(),
        module_repo_url: format!("git@x/{module}.git"),
        action,
    }
}

/// A bare manifest repository whose default branch is `production`.
///
/// Mutations go through throwaway clones, the way a colleague pushing to the
/// shared remote would.
pub struct ManifestRemote {
    dir: TempDir,
    bare: PathBuf,
    url: String,
}

impl ManifestRemote {
    /// Creates the remote with `puppetfile` committed on `production`.
    pub fn new(puppetfile: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let bare = dir.path().join("puppetfile.git");
        std::fs::create_dir_all(&bare).unwrap();
        run_git_sync(&bare, &["init", "--bare"]).unwrap();
        run_git_sync(&bare, &["symbolic-ref", "HEAD", "refs/heads/production"]).unwrap();
        let url = bare.to_str().unwrap().to_string();

        let seed = TempDir::new_in(dir.path()).unwrap();
        run_git_sync(seed.path(), &["init"]).unwrap();
        std::fs::write(seed.path().join("Puppetfile"), puppetfile).unwrap();
        run_git_sync(seed.path(), &["add", "."]).unwrap();
        run_git_commit(
            seed.path(),
            &test_identity(),
            &["commit", "-m", "Initial Puppetfile"],
        )
        .unwrap();
        run_git_sync(seed.path(), &["push", &url, "HEAD:refs/heads/production"]).unwrap();

        ManifestRemote { dir, bare, url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn path(&self) -> &Path {
        &self.bare
    }

    fn scratch_clone(&self) -> TempDir {
        let scratch = TempDir::new_in(self.dir.path()).unwrap();
        run_git_sync(scratch.path(), &["clone", &self.url, "."]).unwrap();
        scratch
    }

    fn has_branch(&self, branch: &str) -> bool {
        self.branches().iter().any(|b| b == branch)
    }

    /// Commits `content` to `path` on `branch`, creating the branch from
    /// `production` when needed, and pushes.
    pub fn push_file(&self, branch: &str, path: &str, content: &str) {
        let scratch = self.scratch_clone();
        let work = scratch.path();
        if self.has_branch(branch) {
            run_git_sync(work, &["checkout", "-B", branch, &format!("origin/{branch}")]).unwrap();
        } else {
            run_git_sync(work, &["checkout", "-b", branch, "origin/production"]).unwrap();
        }
        std::fs::write(work.join(path), content).unwrap();
        run_git_sync(work, &["add", "-A"]).unwrap();
        run_git_commit(
            work,
            &test_identity(),
            &["commit", "-m", &format!("Update {path}")],
        )
        .unwrap();
        run_git_sync(work, &["push", "origin", branch]).unwrap();
    }

    /// Creates `branch` pointing at `production`.
    pub fn create_branch(&self, branch: &str) {
        run_git_sync(&self.bare, &["branch", branch, "production"]).unwrap();
    }

    pub fn delete_branch(&self, branch: &str) {
        run_git_sync(&self.bare, &["branch", "-D", branch]).unwrap();
    }

    pub fn branches(&self) -> Vec<String> {
        let out = run_git_stdout(
            &self.bare,
            &["for-each-ref", "--format=%(refname:short)", "refs/heads"],
        )
        .unwrap();
        out.lines().map(str::to_string).collect()
    }

    pub fn head(&self, branch: &str) -> String {
        run_git_stdout(&self.bare, &["rev-parse", &format!("refs/heads/{branch}")]).unwrap()
    }

    pub fn read_file(&self, branch: &str, path: &str) -> String {
        let output =
            run_git_sync(&self.bare, &["show", &format!("refs/heads/{branch}:{path}")]).unwrap();
        String::from_utf8(output.stdout).unwrap()
    }

    pub fn last_message(&self, branch: &str) -> String {
        run_git_stdout(
            &self.bare,
            &["log", "-1", "--format=%s", &format!("refs/heads/{branch}")],
        )
        .unwrap()
    }

    pub fn commit_count(&self, branch: &str) -> usize {
        run_git_stdout(
            &self.bare,
            &["rev-list", "--count", &format!("refs/heads/{branch}")],
        )
        .unwrap()
        .parse()
        .unwrap()
    }
}

/// A deployment trigger that records requests and answers with a fixed
/// terminal status.
#[derive(Clone)]
pub struct RecordingDeployer {
    requests: Arc<Mutex<Vec<DeploymentRequest>>>,
    final_status: ExecutionStatus,
}

impl RecordingDeployer {
    pub fn succeeding() -> Self {
        Self::with_status(ExecutionStatus::Succeeded)
    }

    pub fn with_status(final_status: ExecutionStatus) -> Self {
        RecordingDeployer {
            requests: Arc::new(Mutex::new(Vec::new())),
            final_status,
        }
    }

    pub fn requests(&self) -> Vec<DeploymentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl DeploymentTrigger for RecordingDeployer {
    async fn deploy(
        &self,
        request: &DeploymentRequest,
    ) -> Result<DeploymentResult, RundeckError> {
        let execution_id = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            ExecutionId::new(requests.len().to_string())
        };

        if self.final_status.is_success() {
            Ok(DeploymentResult {
                execution_id,
                status: self.final_status.clone(),
            })
        } else {
            Err(RundeckError::JobFailed {
                log_url: format!("http://rundeck.test/project/p/execution/show/{execution_id}"),
                execution_id,
                status: self.final_status.clone(),
            })
        }
    }
}
