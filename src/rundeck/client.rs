//! HTTP client for the Rundeck job API.

use std::time::Duration;

use tracing::instrument;

use crate::types::{DeployKind, DeploymentRequest, DeploymentResult, ExecutionId, ExecutionStatus};

use super::DeploymentTrigger;
use super::error::{Result, RundeckError};
use super::xml::{parse_execution, parse_execution_status};

/// Default delay between two status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Connection and job settings for Rundeck.
#[derive(Clone, PartialEq, Eq)]
pub struct RundeckConfig {
    /// Base URL, e.g. `https://rundeck.example.com`.
    pub base_url: String,
    pub api_version: String,
    pub project: String,
    pub api_token: String,
    /// Job deploying a whole environment.
    pub env_job_id: String,
    /// Job deploying one module of an environment.
    pub module_job_id: String,
    pub poll_interval: Duration,
    /// When set, the pusher is passed to the job as `-<option> <user>`.
    pub push_user_option: Option<String>,
}

// Hand-written so the token never shows up in debug output.
impl std::fmt::Debug for RundeckConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RundeckConfig")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("project", &self.project)
            .field("api_token", &"<redacted>")
            .field("env_job_id", &self.env_job_id)
            .field("module_job_id", &self.module_job_id)
            .field("poll_interval", &self.poll_interval)
            .field("push_user_option", &self.push_user_option)
            .finish()
    }
}

/// Triggers Rundeck jobs and waits for them to finish.
#[derive(Debug, Clone)]
pub struct RundeckClient {
    http: reqwest::Client,
    config: RundeckConfig,
}

impl RundeckClient {
    pub fn new(config: RundeckConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| RundeckError::Transport {
                action: "build the HTTP client",
                source,
            })?;
        Ok(RundeckClient { http, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}/{}", self.base_url(), self.config.api_version, path)
    }

    /// Operator-facing page with the logs of an execution.
    pub fn log_url(&self, execution_id: &ExecutionId) -> String {
        format!(
            "{}/project/{}/execution/show/{}",
            self.base_url(),
            self.config.project,
            execution_id
        )
    }

    fn job_id(&self, kind: DeployKind) -> &str {
        match kind {
            DeployKind::FullEnvironment => &self.config.env_job_id,
            DeployKind::SingleModule => &self.config.module_job_id,
        }
    }

    /// The job's `argString`.
    pub fn arg_string(&self, request: &DeploymentRequest) -> String {
        let mut args = format!("-r10k_env {}", quote_arg(&request.branch));
        if request.kind == DeployKind::SingleModule {
            args.push_str(&format!(" -r10k_module {}", quote_arg(&request.module_name)));
        }
        if let Some(option) = &self.config.push_user_option
            && !request.push_user.is_empty()
        {
            args.push_str(&format!(" -{} {}", option, quote_arg(&request.push_user)));
        }
        args
    }

    async fn send(&self, request: reqwest::RequestBuilder, action: &'static str) -> Result<String> {
        let response = request
            .header(reqwest::header::ACCEPT, "application/xml")
            .query(&[("authtoken", self.config.api_token.as_str())])
            .send()
            .await
            .map_err(|e| RundeckError::Transport {
                action,
                source: e.without_url(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| RundeckError::Transport {
            action,
            source: e.without_url(),
        })?;

        if !status.is_success() {
            return Err(RundeckError::UnexpectedStatus {
                action,
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    /// Starts the job matching `request` and returns the new execution id.
    pub async fn run_job(&self, request: &DeploymentRequest) -> Result<ExecutionId> {
        if request.branch.is_empty() || request.module_name.is_empty() {
            return Err(RundeckError::InvalidRequest(
                "branch and module are required".to_string(),
            ));
        }

        let url = self.api_url(&format!("job/{}/run", self.job_id(request.kind)));
        let arg_string = self.arg_string(request);
        let body = self
            .send(
                self.http.post(url).form(&[("argString", arg_string.as_str())]),
                "launch the job",
            )
            .await?;

        let execution = parse_execution(&body)?;
        tracing::debug!(execution = %execution.id, "job launched");
        Ok(execution.id)
    }

    /// Fetches the current status of an execution.
    pub async fn execution_status(&self, execution_id: &ExecutionId) -> Result<ExecutionStatus> {
        let url = self.api_url(&format!("execution/{execution_id}"));
        let body = self
            .send(self.http.get(url), "check job execution status")
            .await?;
        parse_execution_status(&body)
    }

    /// Polls until the execution leaves the `running` state.
    ///
    /// There is no timeout: Rundeck jobs are expected to carry their own.
    pub async fn wait_for(&self, execution_id: &ExecutionId) -> Result<ExecutionStatus> {
        loop {
            let status = self.execution_status(execution_id).await?;
            if !status.is_running() {
                return Ok(status);
            }
            tracing::trace!(execution = %execution_id, "execution still running");
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

impl DeploymentTrigger for RundeckClient {
    #[instrument(skip(self, request), fields(kind = %request.kind, branch = %request.branch, module = %request.module_name))]
    async fn deploy(&self, request: &DeploymentRequest) -> Result<DeploymentResult> {
        let execution_id = self.run_job(request).await?;
        tracing::info!(execution = %execution_id, "deployment started");

        let status = self.wait_for(&execution_id).await?;

        if status.is_success() {
            tracing::info!(execution = %execution_id, "deployment succeeded");
            Ok(DeploymentResult {
                execution_id,
                status,
            })
        } else {
            Err(RundeckError::JobFailed {
                log_url: self.log_url(&execution_id),
                execution_id,
                status,
            })
        }
    }
}

/// Quotes an argString value so Rundeck reads it as a single token.
///
/// Values with whitespace or quotes are wrapped in double quotes, with inner
/// quotes and backslashes escaped.
fn quote_arg(value: &str) -> std::borrow::Cow<'_, str> {
    if !value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\'))
    {
        return value.into();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted.into()
}
