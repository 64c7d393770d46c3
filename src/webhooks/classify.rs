//! Classification of push events into manifest actions.
//!
//! The rules, in order:
//!
//! 1. No payload, or a required field missing: rejected.
//! 2. The event comes from the manifest repository itself: rejected. This
//!    catches webhooks installed on every repository of a group by automation.
//! 3. The ref is not `refs/heads/<branch>`: rejected (tags are not handled).
//! 4. `before` all zeros: the branch was created.
//! 5. `after` all zeros: the branch was deleted, unless it is `production`,
//!    whose deletion is refused outright.
//! 6. Anything else: the branch was modified.
//!
//! Classification is pure and total: every input yields an [`EventInfo`] or a
//! [`Rejection`].

use thiserror::Error;

use crate::types::{ActionType, EventInfo, PRODUCTION_BRANCH};

use super::payload::WebhookPayload;

/// Why a webhook was not turned into a job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("no JSON payload to process")]
    MissingPayload,

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("payload is missing required field {0}")]
    MissingField(&'static str),

    #[error("this webhook is not intended to be used by the Puppetfile repository")]
    ManifestRepository,

    #[error("invalid ref {0:?}: expected refs/<type>/<name>")]
    InvalidRef(String),

    #[error("a reference of type {0:?} was passed but only \"heads\" references are handled")]
    UnsupportedRefType(String),

    #[error("deletion of the \"production\" branch is not allowed")]
    ProductionDeletion,
}

/// Classifies a push event.
///
/// `manifest_repo_url` is the Puppetfile repository URL; it is copied into
/// the resulting [`EventInfo`] and used to reject self-events.
pub fn classify(
    payload: Option<&WebhookPayload>,
    manifest_repo_url: &str,
) -> Result<EventInfo, Rejection> {
    let payload = payload.ok_or(Rejection::MissingPayload)?;

    let module_name = payload
        .repository_name()
        .ok_or(Rejection::MissingField("repository.name"))?;
    let module_repo_url = payload
        .repository_url()
        .ok_or(Rejection::MissingField("repository.git_ssh_url"))?;
    let git_ref = payload
        .git_ref
        .as_deref()
        .ok_or(Rejection::MissingField("ref"))?;
    let before = payload
        .before
        .as_deref()
        .ok_or(Rejection::MissingField("before"))?;
    let after = payload
        .after
        .as_deref()
        .ok_or(Rejection::MissingField("after"))?;

    if payload.repository_urls().any(|url| url == manifest_repo_url) {
        return Err(Rejection::ManifestRepository);
    }

    let (ref_type, branch) = split_ref(git_ref)?;
    if ref_type != "heads" {
        return Err(Rejection::UnsupportedRefType(ref_type.to_string()));
    }

    let action = if is_null_sha(before) {
        ActionType::Create
    } else if is_null_sha(after) {
        if branch == PRODUCTION_BRANCH {
            return Err(Rejection::ProductionDeletion);
        }
        ActionType::Delete
    } else {
        ActionType::Modify
    };

    Ok(EventInfo {
        manifest_repo_url: manifest_repo_url.to_string(),
        push_user: payload.pusher().unwrap_or_default().to_string(),
        module_name: module_name.to_string(),
        branch: branch.to_string(),
        module_repo_url: module_repo_url.to_string(),
        action,
    })
}

/// Splits `refs/<type>/<name>` into its type and name.
///
/// The name keeps any further slashes (`refs/heads/feature/x` is branch
/// `feature/x`).
fn split_ref(git_ref: &str) -> Result<(&str, &str), Rejection> {
    let invalid = || Rejection::InvalidRef(git_ref.to_string());
    let rest = git_ref.strip_prefix("refs/").ok_or_else(invalid)?;
    let (ref_type, name) = rest.split_once('/').ok_or_else(invalid)?;
    if ref_type.is_empty() || name.is_empty() {
        return Err(invalid());
    }
    Ok((ref_type, name))
}

/// A null SHA is a non-empty run of zeros.
fn is_null_sha(sha: &str) -> bool {
    !sha.is_empty() && sha.bytes().all(|b| b == b'0')
}
