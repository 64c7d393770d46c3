//! Git workflow over a job's clone of the manifest repository.
//!
//! All methods are synchronous and run on the blocking pool. Within a job they
//! are strictly sequential: each one depends on the on-disk state left by the
//! previous one.

use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::types::PRODUCTION_BRANCH;

use super::{
    GitConfig, GitError, GitResult, captured_output, command_failed, git_command,
    git_commit_command, rev_parse, run_git_commit, run_git_stdout, run_git_sync,
};

/// Commit message for a manifest ref change.
pub fn commit_message(module: &str, branch: &str) -> String {
    format!("Changing :ref for module {module} in branch {branch}")
}

/// A clone of the manifest repository.
#[derive(Debug)]
pub struct ManifestRepo {
    path: PathBuf,
    config: GitConfig,
}

impl ManifestRepo {
    /// Clones `url` into `target`, which must be empty or absent.
    ///
    /// The remote is named after `config.remote_name`.
    #[instrument(skip(config), fields(target = %target.display()))]
    pub fn clone(url: &str, target: &Path, config: &GitConfig) -> GitResult<Self> {
        std::fs::create_dir_all(target)?;
        run_git_sync(
            target,
            &["clone", "--origin", &config.remote_name, url, "."],
        )?;
        Ok(ManifestRepo {
            path: target.to_path_buf(),
            config: config.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn remote(&self) -> &str {
        &self.config.remote_name
    }

    fn remote_production(&self) -> String {
        format!("{}/{}", self.remote(), PRODUCTION_BRANCH)
    }

    /// Fetches every ref, pruning branches deleted on the remote.
    pub fn fetch(&self) -> GitResult<()> {
        run_git_sync(&self.path, &["fetch", "--prune", "-v", self.remote()])?;
        Ok(())
    }

    /// Whether `name` exists as a head on the remote.
    ///
    /// Asks the remote directly rather than trusting remote-tracking refs.
    pub fn branch_exists(&self, name: &str) -> GitResult<bool> {
        let heads = run_git_stdout(&self.path, &["ls-remote", "--heads", self.remote()])?;
        let wanted = format!("refs/heads/{name}");
        Ok(heads
            .lines()
            .filter_map(|line| line.split('\t').nth(1))
            .any(|r| r == wanted))
    }

    /// Creates and switches to a new local branch started from `production`.
    #[instrument(skip(self))]
    pub fn checkout_new(&self, name: &str) -> GitResult<()> {
        run_git_sync(
            &self.path,
            &["checkout", "--no-track", "-b", name, &self.remote_production()],
        )?;
        Ok(())
    }

    /// Switches to an existing remote branch and merges `production` into it.
    ///
    /// Conflicts prefer the feature branch (`-X ours`). Returns whether the
    /// merge moved HEAD, i.e. whether `production` contributed new commits.
    #[instrument(skip(self))]
    pub fn checkout_existing(&self, name: &str) -> GitResult<bool> {
        let remote_branch = format!("{}/{}", self.remote(), name);
        run_git_sync(
            &self.path,
            &["checkout", "--force", "-B", name, &remote_branch],
        )?;
        run_git_commit(
            &self.path,
            &self.config.commit_identity,
            &["pull", "--no-rebase", self.remote(), name],
        )?;

        let before = rev_parse(&self.path, "HEAD")?;
        self.merge_production(name)?;
        let after = rev_parse(&self.path, "HEAD")?;

        let merged = before != after;
        tracing::info!(branch = name, merged, "merged production into branch");
        Ok(merged)
    }

    fn merge_production(&self, branch: &str) -> GitResult<()> {
        let target = self.remote_production();
        let args = ["merge", target.as_str(), "-X", "ours", "--no-edit"];
        let output = git_commit_command(&self.path, &self.config.commit_identity)
            .args(args)
            .output()?;

        if output.status.success() {
            return Ok(());
        }

        // Git reports conflicts on stdout, not stderr
        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        if combined.contains("CONFLICT") || combined.contains("Automatic merge failed") {
            if let Err(e) = run_git_sync(&self.path, &["merge", "--abort"]) {
                tracing::warn!(branch, error = %e, "failed to abort conflicting merge");
            }
            return Err(GitError::MergeConflict {
                branch: branch.to_string(),
                details: captured_output(&output),
            });
        }

        Err(command_failed(&args, &output))
    }

    /// Commits every tracked change with the standard ref-change message.
    #[instrument(skip(self))]
    pub fn commit(&self, module: &str, branch: &str) -> GitResult<()> {
        let message = commit_message(module, branch);
        run_git_commit(
            &self.path,
            &self.config.commit_identity,
            &["commit", "-a", "-m", &message],
        )?;
        Ok(())
    }

    /// Pushes `branch` to the remote.
    ///
    /// A rejection (the remote moved on since the fetch) is reported as
    /// [`GitError::PushRejected`] and is not retried.
    #[instrument(skip(self))]
    pub fn push(&self, branch: &str) -> GitResult<()> {
        let args = ["push", self.remote(), branch];
        let output = git_command(&self.path).args(args).output()?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("rejected") || stderr.contains("non-fast-forward") {
            return Err(GitError::PushRejected {
                branch: branch.to_string(),
                details: stderr.trim().to_string(),
            });
        }

        Err(command_failed(&args, &output))
    }

    /// Deletes `branch` on the remote. `production` is refused.
    #[instrument(skip(self))]
    pub fn delete_remote_branch(&self, branch: &str) -> GitResult<()> {
        if branch == PRODUCTION_BRANCH {
            return Err(GitError::ProtectedBranch(branch.to_string()));
        }
        run_git_sync(&self.path, &["push", self.remote(), "--delete", branch])?;
        Ok(())
    }

    /// Whether the working tree has uncommitted changes.
    pub fn has_local_changes(&self) -> GitResult<bool> {
        let status = run_git_stdout(&self.path, &["status", "--porcelain"])?;
        Ok(!status.is_empty())
    }
}
