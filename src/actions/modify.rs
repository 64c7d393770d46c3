//! A module branch received new commits.
//!
//! The manifest branch normally exists already. It is brought up to date
//! with `production`, and the module's entry is pointed at the branch if it
//! isn't yet.

use std::path::Path;

use crate::manifest::Puppetfile;
use crate::types::{DeploymentRequest, EventInfo};

use super::{ActionSettings, Plan, Result, checkout_branch, clone_manifest, point_module_at, publish};

pub fn prepare(settings: &ActionSettings, event: &EventInfo, path: &Path) -> Result<Plan> {
    let repo = clone_manifest(settings, event, path)?;

    if !repo.branch_exists(&event.branch)? {
        // The create event was missed or failed; recover by creating it now.
        tracing::warn!(
            branch = %event.branch,
            "branch missing from manifest repository, creating it"
        );
    }
    let full_deployment_needed = checkout_branch(&repo, &event.branch)?;

    let mut manifest = Puppetfile::load(&repo.path().join(&settings.manifest_file))?;
    let changed = point_module_at(&mut manifest, event, &event.branch)?;

    publish(&repo, settings, &manifest, event, changed, full_deployment_needed)?;

    Ok(Plan::Deploy(DeploymentRequest::for_event(
        event,
        full_deployment_needed,
    )))
}

#[cfg(test)]
mod tests {
    use crate::actions::{ActionOutcome, ActionRunner};
    use crate::test_utils::{ManifestRemote, RecordingDeployer, event, test_action_settings};
    use crate::types::{ActionType, DeployKind};
    use tempfile::TempDir;

    const PUPPETFILE: &str = "mod \"apache\",\n  :git => \"git@x/apache.git\",\n  :ref => \"production\"\n\nmod \"apache_ext\",\n  :git => \"git@x/apache_ext.git\",\n  :ref => \"production\"\n";

    fn on_branch(branch: &str) -> String {
        PUPPETFILE.replacen(":ref => \"production\"", &format!(":ref => \"{branch}\""), 1)
    }

    async fn run(remote: &ManifestRemote, module: &str) -> RecordingDeployer {
        let base = TempDir::new().unwrap();
        let deployer = RecordingDeployer::succeeding();
        let outcome = ActionRunner::new(test_action_settings(base.path()), deployer.clone())
            .run(&event(remote, ActionType::Modify, module, "feat-1"))
            .await
            .unwrap();
        assert!(matches!(outcome, ActionOutcome::Deployed(_)));
        deployer
    }

    #[tokio::test]
    async fn ref_already_on_branch_means_module_deploy_without_push() {
        let remote = ManifestRemote::new(PUPPETFILE);
        remote.push_file("feat-1", "Puppetfile", &on_branch("feat-1"));
        let head = remote.head("feat-1");

        let deployer = run(&remote, "apache").await;

        assert_eq!(remote.head("feat-1"), head);
        assert_eq!(deployer.requests()[0].kind, DeployKind::SingleModule);
    }

    #[tokio::test]
    async fn stale_ref_is_replaced_and_pushed() {
        let remote = ManifestRemote::new(PUPPETFILE);
        remote.create_branch("feat-1");

        let deployer = run(&remote, "apache").await;

        assert_eq!(remote.read_file("feat-1", "Puppetfile"), on_branch("feat-1"));
        assert_eq!(
            remote.last_message("feat-1"),
            "Changing :ref for module apache in branch feat-1"
        );
        assert_eq!(deployer.requests()[0].kind, DeployKind::SingleModule);
    }

    #[tokio::test]
    async fn prefixed_module_name_is_not_confused() {
        let remote = ManifestRemote::new(PUPPETFILE);
        remote.create_branch("feat-1");

        run(&remote, "apache_ext").await;

        assert_eq!(
            remote.read_file("feat-1", "Puppetfile"),
            PUPPETFILE.replace(
                "apache_ext.git\",\n  :ref => \"production\"",
                "apache_ext.git\",\n  :ref => \"feat-1\""
            )
        );
    }

    #[tokio::test]
    async fn missing_module_is_appended() {
        let remote = ManifestRemote::new(PUPPETFILE);
        remote.create_branch("feat-1");

        run(&remote, "mymodule").await;

        let text = remote.read_file("feat-1", "Puppetfile");
        assert!(text.starts_with(PUPPETFILE));
        assert!(text.ends_with(
            "mod \"mymodule\",\n  :git => \"git@x/mymodule.git\",\n  :ref => \"feat-1\"\n"
        ));
    }

    #[tokio::test]
    async fn missing_branch_is_created_with_full_deploy() {
        let remote = ManifestRemote::new(PUPPETFILE);

        let deployer = run(&remote, "apache").await;

        assert_eq!(remote.read_file("feat-1", "Puppetfile"), on_branch("feat-1"));
        assert_eq!(deployer.requests()[0].kind, DeployKind::FullEnvironment);
    }

    #[tokio::test]
    async fn production_merge_triggers_full_deploy_even_without_ref_change() {
        let remote = ManifestRemote::new(PUPPETFILE);
        remote.push_file("feat-1", "Puppetfile", &on_branch("feat-1"));
        remote.push_file("production", "hiera.yaml", "---\n");
        let commits = remote.commit_count("feat-1");

        let deployer = run(&remote, "apache").await;

        // The production commit and the merge commit.
        assert_eq!(remote.commit_count("feat-1"), commits + 2);
        assert_eq!(remote.read_file("feat-1", "Puppetfile"), on_branch("feat-1"));
        assert_eq!(deployer.requests()[0].kind, DeployKind::FullEnvironment);
    }
}
