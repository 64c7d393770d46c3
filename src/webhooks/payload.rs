//! GitLab push webhook payload.
//!
//! Only the handful of fields the classifier needs are modelled. Every field
//! is optional at this layer so that a sparse or odd payload becomes a
//! classification rejection instead of a deserialization failure.

use serde::Deserialize;

use super::classify::Rejection;

/// The subset of a GitLab push event the deployer cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub user_name: Option<String>,
    pub user_username: Option<String>,
    pub repository: Option<RawRepository>,
}

/// Repository block of a push event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawRepository {
    pub name: Option<String>,
    pub git_ssh_url: Option<String>,
    pub git_http_url: Option<String>,
}

impl WebhookPayload {
    /// Repository clone URL, preferring the SSH form.
    pub fn repository_url(&self) -> Option<&str> {
        let repo = self.repository.as_ref()?;
        non_empty(repo.git_ssh_url.as_deref()).or_else(|| non_empty(repo.git_http_url.as_deref()))
    }

    /// Every non-empty clone URL the event carries, SSH first.
    pub fn repository_urls(&self) -> impl Iterator<Item = &str> {
        self.repository
            .iter()
            .flat_map(|repo| [repo.git_ssh_url.as_deref(), repo.git_http_url.as_deref()])
            .filter_map(non_empty)
    }

    pub fn repository_name(&self) -> Option<&str> {
        non_empty(self.repository.as_ref()?.name.as_deref())
    }

    /// Display name of the pusher, falling back to the username.
    pub fn pusher(&self) -> Option<&str> {
        non_empty(self.user_name.as_deref()).or_else(|| non_empty(self.user_username.as_deref()))
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

/// Parses a raw request body into a payload.
///
/// An empty body is reported as a missing payload; anything that is not a
/// JSON object with the expected shape is malformed.
pub fn parse_payload(body: &[u8]) -> Result<WebhookPayload, Rejection> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(Rejection::MissingPayload);
    }
    serde_json::from_slice(body).map_err(|e| Rejection::Malformed(e.to_string()))
}
