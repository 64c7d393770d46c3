//! A branch was created in a module repository.
//!
//! The manifest branch of the same name is created from `production` (or
//! brought up to date if it already exists), and the module's entry is
//! pointed at the new branch. A module missing from the manifest is appended.

use std::path::Path;

use crate::manifest::Puppetfile;
use crate::types::{DeploymentRequest, EventInfo};

use super::{ActionSettings, Plan, Result, checkout_branch, clone_manifest, point_module_at, publish};

pub fn prepare(settings: &ActionSettings, event: &EventInfo, path: &Path) -> Result<Plan> {
    let repo = clone_manifest(settings, event, path)?;
    let full_deployment_needed = checkout_branch(&repo, &event.branch)?;

    let mut manifest = Puppetfile::load(&repo.path().join(&settings.manifest_file))?;
    let changed = point_module_at(&mut manifest, event, &event.branch)?;

    publish(&repo, settings, &manifest, event, changed, full_deployment_needed)?;

    Ok(Plan::Deploy(DeploymentRequest::for_event(
        event,
        full_deployment_needed,
    )))
}
