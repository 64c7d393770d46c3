//! Process configuration, read from environment variables.
//!
//! # Required
//!
//! - `PUPPETFILE_URL`: clone URL of the manifest repository
//! - `RD_BASEURL`, `RD_API_VERSION`, `RD_PROJECT_NAME`, `RD_API_TOKEN`
//! - `RD_API_JOB_ENV_ID`: job deploying a whole environment
//! - `RD_API_JOB_MOD_ID`: job deploying a single module
//!
//! # Optional
//!
//! | Variable                      | Default                          |
//! |-------------------------------|----------------------------------|
//! | `LISTEN_PORT`                 | 3000                             |
//! | `PUPPETFILE_GIT_REMOTE_NAME`  | origin                           |
//! | `PUPPETFILE_PATH`             | Puppetfile                       |
//! | `WORKDIR_BASE`                | /var/tmp                         |
//! | `WORKDIR_MAX_AGE_HOURS`       | 24                               |
//! | `SPOOL_DIR`                   | /var/lib/r10k-deployer/spool     |
//! | `QUEUE_NAME`                  | r10k                             |
//! | `SPOOL_POLL_INTERVAL_SECS`    | 30                               |
//! | `RD_POLL_INTERVAL_SECS`       | 5                                |
//! | `RD_PUSH_USER_OPTION`         | unset                            |
//! | `GIT_AUTHOR_NAME`             | r10k-deployer                    |
//! | `GIT_AUTHOR_EMAIL`            | r10k-deployer@localhost          |
//! | `GITLAB_WEBHOOK_TOKEN`        | unset                            |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::actions::ActionSettings;
use crate::git::{CommitIdentity, GitConfig};
use crate::rundeck::{DEFAULT_POLL_INTERVAL, RundeckConfig};
use crate::worker::{DEFAULT_SPOOL_POLL_SECS, PollConfig};

/// Variables that must be set.
pub const REQUIRED_VARS: [&str; 7] = [
    "PUPPETFILE_URL",
    "RD_BASEURL",
    "RD_API_VERSION",
    "RD_PROJECT_NAME",
    "RD_API_TOKEN",
    "RD_API_JOB_ENV_ID",
    "RD_API_JOB_MOD_ID",
];

const DEFAULT_LISTEN_PORT: u16 = 3000;
const DEFAULT_REMOTE_NAME: &str = "origin";
const DEFAULT_PUPPETFILE_PATH: &str = "Puppetfile";
const DEFAULT_WORKDIR_BASE: &str = "/var/tmp";
const DEFAULT_WORKDIR_MAX_AGE_HOURS: u64 = 24;
const DEFAULT_SPOOL_DIR: &str = "/var/lib/r10k-deployer/spool";
const DEFAULT_QUEUE_NAME: &str = "r10k";
const DEFAULT_AUTHOR_NAME: &str = "r10k-deployer";
const DEFAULT_AUTHOR_EMAIL: &str = "r10k-deployer@localhost";

/// Errors that can occur while reading the configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Every required variable that is unset or empty.
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Result type for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Everything the process needs to run.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_port: u16,
    /// Manifest repository announced in every job.
    pub puppetfile_url: String,
    pub actions: ActionSettings,
    pub workdir_max_age: Duration,
    pub spool_dir: PathBuf,
    pub queue_name: String,
    pub poll: PollConfig,
    pub rundeck: RundeckConfig,
    /// Expected `X-Gitlab-Token`, if webhook authentication is enabled.
    pub gitlab_token: Option<String>,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let missing: Vec<&'static str> = REQUIRED_VARS
            .into_iter()
            .filter(|name| get(*name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        let required = |name: &'static str| get(name).unwrap_or_default();
        let or = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let rundeck = RundeckConfig {
            base_url: required("RD_BASEURL"),
            api_version: required("RD_API_VERSION"),
            project: required("RD_PROJECT_NAME"),
            api_token: required("RD_API_TOKEN"),
            env_job_id: required("RD_API_JOB_ENV_ID"),
            module_job_id: required("RD_API_JOB_MOD_ID"),
            poll_interval: parsed(&get, "RD_POLL_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            push_user_option: get("RD_PUSH_USER_OPTION"),
        };

        let actions = ActionSettings {
            workdir_base: PathBuf::from(or("WORKDIR_BASE", DEFAULT_WORKDIR_BASE)),
            git: GitConfig {
                remote_name: or("PUPPETFILE_GIT_REMOTE_NAME", DEFAULT_REMOTE_NAME),
                commit_identity: CommitIdentity {
                    name: or("GIT_AUTHOR_NAME", DEFAULT_AUTHOR_NAME),
                    email: or("GIT_AUTHOR_EMAIL", DEFAULT_AUTHOR_EMAIL),
                },
            },
            manifest_file: PathBuf::from(or("PUPPETFILE_PATH", DEFAULT_PUPPETFILE_PATH)),
        };

        let max_age_hours: u64 =
            parsed(&get, "WORKDIR_MAX_AGE_HOURS")?.unwrap_or(DEFAULT_WORKDIR_MAX_AGE_HOURS);
        let workdir_max_age = max_age_hours
            .checked_mul(3600)
            .map(Duration::from_secs)
            .ok_or_else(|| ConfigError::Invalid {
                name: "WORKDIR_MAX_AGE_HOURS",
                value: max_age_hours.to_string(),
            })?;
        let spool_poll_secs =
            parsed(&get, "SPOOL_POLL_INTERVAL_SECS")?.unwrap_or(DEFAULT_SPOOL_POLL_SECS);

        Ok(Config {
            listen_port: parsed(&get, "LISTEN_PORT")?.unwrap_or(DEFAULT_LISTEN_PORT),
            puppetfile_url: required("PUPPETFILE_URL"),
            actions,
            workdir_max_age,
            spool_dir: PathBuf::from(or("SPOOL_DIR", DEFAULT_SPOOL_DIR)),
            queue_name: or("QUEUE_NAME", DEFAULT_QUEUE_NAME),
            poll: PollConfig::with_interval(Duration::from_secs(spool_poll_secs)),
            rundeck,
            gitlab_token: get("GITLAB_WEBHOOK_TOKEN"),
        })
    }
}

/// Parses an optional variable, rejecting values that don't parse.
fn parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<T>> {
    get(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { name, value })
        })
        .transpose()
}
