//! Local git operations against a disposable clone of the manifest repository.
//!
//! This module implements the git side of every action:
//! - Working-copy management (one uniquely named directory per job)
//! - Clone, fetch, checkout and merge of `production` into a feature branch
//! - Commit, push and remote branch deletion
//!
//! Every command runs the `git` binary with system and user configuration
//! disabled. Commit identity is passed per command with `-c` flags, so no
//! `.git/config` is ever written.

pub mod repository;
pub mod workdir;

use std::path::Path;
use std::process::{Command, Output};

use thiserror::Error;

pub use repository::ManifestRepo;
pub use workdir::{WORKDIR_PREFIX, WorkingCopy, sweep_stale_workdirs};

/// Errors from git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Git command failed.
    #[error("git command failed: {command}\n{output}")]
    CommandFailed { command: String, output: String },

    /// Merging `production` left conflicts that `-X ours` could not resolve.
    #[error("merge conflict on branch {branch}: {details}")]
    MergeConflict { branch: String, details: String },

    /// Push was rejected because the remote diverged.
    #[error("push of branch {branch} rejected: {details}")]
    PushRejected { branch: String, details: String },

    /// Refused to delete a protected branch.
    #[error("refusing to delete protected branch {0}")]
    ProtectedBranch(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Identity used for creating commits.
///
/// This is passed via `-c` flags to git commands, ensuring commits can be
/// created even when global/system git config is disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    /// The committer/author name (git `user.name`).
    pub name: String,

    /// The committer/author email (git `user.email`).
    pub email: String,
}

/// Configuration for git operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitConfig {
    /// Name given to the manifest remote in every clone (default `origin`).
    pub remote_name: String,

    /// Identity for commits and merge commits.
    pub commit_identity: CommitIdentity,
}

/// Create a git Command with clean environment (no system/user config).
///
/// This ensures consistent behavior across different machines by ignoring
/// system and user git configuration (e.g., rerere, hooks, aliases).
pub(crate) fn git_command(workdir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(workdir);

    // Disable system and user config for reproducible behavior
    cmd.env("GIT_CONFIG_NOSYSTEM", "1");
    cmd.env("GIT_CONFIG_GLOBAL", "/dev/null");

    // Disable terminal prompts
    cmd.env("GIT_TERMINAL_PROMPT", "0");

    cmd
}

/// Create a git Command configured for commit operations.
///
/// This extends [`git_command`] with `-c user.name=<name>` and
/// `-c user.email=<email>`.
pub(crate) fn git_commit_command(workdir: &Path, identity: &CommitIdentity) -> Command {
    let mut cmd = git_command(workdir);
    cmd.arg("-c");
    cmd.arg(format!("user.name={}", identity.name));
    cmd.arg("-c");
    cmd.arg(format!("user.email={}", identity.email));
    cmd
}

/// Formats the captured output of a failed command for diagnostics.
fn captured_output(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    match (stderr.trim().is_empty(), stdout.trim().is_empty()) {
        (false, false) => format!("stderr: {}\nstdout: {}", stderr.trim(), stdout.trim()),
        (false, true) => format!("stderr: {}", stderr.trim()),
        (true, false) => format!("stdout: {}", stdout.trim()),
        (true, true) => format!("exit status: {}", output.status),
    }
}

fn command_failed(args: &[&str], output: &Output) -> GitError {
    GitError::CommandFailed {
        command: format!("git {}", args.join(" ")),
        output: captured_output(output),
    }
}

fn run(mut cmd: Command, args: &[&str]) -> GitResult<Output> {
    let output = cmd.args(args).output()?;

    if output.status.success() {
        Ok(output)
    } else {
        Err(command_failed(args, &output))
    }
}

/// Run a git command in the given working directory.
///
/// Returns the command output on success, or a GitError on failure.
/// Uses clean git environment (no system/user config) for consistent behavior.
pub fn run_git_sync(workdir: &Path, args: &[&str]) -> GitResult<Output> {
    run(git_command(workdir), args)
}

/// Run a git command that may create a commit.
pub fn run_git_commit(
    workdir: &Path,
    identity: &CommitIdentity,
    args: &[&str],
) -> GitResult<Output> {
    run(git_commit_command(workdir, identity), args)
}

/// Run a git command and return stdout as a string.
pub fn run_git_stdout(workdir: &Path, args: &[&str]) -> GitResult<String> {
    let output = run_git_sync(workdir, args)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Get the SHA of a revision.
pub fn rev_parse(workdir: &Path, rev: &str) -> GitResult<String> {
    run_git_stdout(workdir, &["rev-parse", rev])
}
