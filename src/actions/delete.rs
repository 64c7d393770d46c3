//! A branch was deleted in a module repository.
//!
//! If no other module still tracks the branch, the manifest branch is
//! deleted and nothing is deployed. Otherwise the module's entry goes back to
//! `production` and the environment is redeployed.

use std::path::Path;

use crate::manifest::Puppetfile;
use crate::types::{DeploymentRequest, EventInfo, PRODUCTION_BRANCH};

use super::{ActionError, ActionOutcome, ActionSettings, Plan, Result, clone_manifest, publish};

pub fn prepare(settings: &ActionSettings, event: &EventInfo, path: &Path) -> Result<Plan> {
    let repo = clone_manifest(settings, event, path)?;

    if !repo.branch_exists(&event.branch)? {
        tracing::info!(branch = %event.branch, "branch already gone from manifest repository");
        return Ok(Plan::Done(ActionOutcome::BranchAlreadyGone));
    }
    let full_deployment_needed = repo.checkout_existing(&event.branch)?;

    let mut manifest = Puppetfile::load(&repo.path().join(&settings.manifest_file))?;
    let others = manifest.modules_referencing_branch(&event.branch, &event.module_name);

    if others.is_empty() {
        repo.delete_remote_branch(&event.branch)?;
        tracing::info!(branch = %event.branch, "no module left on branch, deleted it");
        return Ok(Plan::Done(ActionOutcome::BranchDeleted));
    }
    tracing::info!(
        branch = %event.branch,
        remaining = ?others,
        "branch still used by other modules"
    );

    let anchor = manifest
        .locate(&event.module_name, &event.module_repo_url)
        .ok_or_else(|| ActionError::ManifestInconsistent {
            module: event.module_name.clone(),
            branch: event.branch.clone(),
        })?;
    let changed = manifest.replace_ref(&anchor, PRODUCTION_BRANCH)?;

    publish(&repo, settings, &manifest, event, changed, full_deployment_needed)?;

    Ok(Plan::Deploy(DeploymentRequest::for_event(
        event,
        full_deployment_needed,
    )))
}

#[cfg(test)]
mod tests {
    use crate::actions::{ActionError, ActionOutcome, ActionRunner};
    use crate::test_utils::{ManifestRemote, RecordingDeployer, event, test_action_settings};
    use crate::types::{ActionType, DeployKind};
    use tempfile::TempDir;

    const PRODUCTION: &str = "mod \"apache\",\n  :git => \"git@x/apache.git\",\n  :ref => \"production\"\n\nmod \"ntp\",\n  :git => \"git@x/ntp.git\",\n  :ref => \"production\"\n";

    async fn run(
        remote: &ManifestRemote,
        module: &str,
        deployer: &RecordingDeployer,
    ) -> crate::actions::Result<ActionOutcome> {
        let base = TempDir::new().unwrap();
        let outcome = ActionRunner::new(test_action_settings(base.path()), deployer.clone())
            .run(&event(remote, ActionType::Delete, module, "feat-1"))
            .await;
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
        outcome
    }

    #[tokio::test]
    async fn missing_branch_is_a_no_op() {
        let remote = ManifestRemote::new(PRODUCTION);
        let deployer = RecordingDeployer::succeeding();

        let outcome = run(&remote, "apache", &deployer).await.unwrap();

        assert_eq!(outcome, ActionOutcome::BranchAlreadyGone);
        assert!(deployer.requests().is_empty());
    }

    #[tokio::test]
    async fn last_module_on_branch_deletes_it() {
        let remote = ManifestRemote::new(PRODUCTION);
        remote.push_file(
            "feat-1",
            "Puppetfile",
            &PRODUCTION.replacen("production", "feat-1", 1),
        );
        let deployer = RecordingDeployer::succeeding();

        let outcome = run(&remote, "apache", &deployer).await.unwrap();

        assert_eq!(outcome, ActionOutcome::BranchDeleted);
        assert_eq!(remote.branches(), vec!["production".to_string()]);
        assert!(deployer.requests().is_empty());
    }

    #[tokio::test]
    async fn shared_branch_resets_module_to_production() {
        let remote = ManifestRemote::new(PRODUCTION);
        let shared = PRODUCTION.replace("production", "feat-1");
        remote.push_file("feat-1", "Puppetfile", &shared);
        let deployer = RecordingDeployer::succeeding();

        let outcome = run(&remote, "apache", &deployer).await.unwrap();

        assert!(matches!(outcome, ActionOutcome::Deployed(_)));
        assert_eq!(
            remote.read_file("feat-1", "Puppetfile"),
            shared.replacen("feat-1", "production", 1)
        );
        assert_eq!(
            remote.last_message("feat-1"),
            "Changing :ref for module apache in branch feat-1"
        );
        let requests = deployer.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].kind, DeployKind::SingleModule);
        assert_eq!(requests[0].branch, "feat-1");
    }

    #[tokio::test]
    async fn module_missing_from_shared_branch_is_inconsistent() {
        let remote = ManifestRemote::new(PRODUCTION);
        remote.push_file(
            "feat-1",
            "Puppetfile",
            &PRODUCTION.replace("production", "feat-1"),
        );
        let deployer = RecordingDeployer::succeeding();

        let err = run(&remote, "mymodule", &deployer).await.unwrap_err();

        assert!(
            matches!(err, ActionError::ManifestInconsistent { ref module, .. } if module == "mymodule"),
            "{err:?}"
        );
        assert!(remote.branches().contains(&"feat-1".to_string()));
        assert!(deployer.requests().is_empty());
    }
}
