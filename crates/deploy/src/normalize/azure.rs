use serde_json::Value;
use tracing::debug;

use super::{str_at, ProviderNormalizer};
use crate::config::ProviderSettings;
use crate::errors::DeployError;
use crate::types::{DeployIntent, Provider};

/// Azure DevOps (VSTS) `git.push` service hook events.
///
/// Only the first ref update is considered. The resulting remote is the
/// entry's SSH URL template followed by the repository name.
#[derive(Debug, Clone, Copy, Default)]
pub struct AzureDevOpsNormalizer;

impl ProviderNormalizer for AzureDevOpsNormalizer {
    fn normalize(
        &self,
        body: &Value,
        settings: &ProviderSettings,
    ) -> Result<Option<DeployIntent>, DeployError> {
        let pushed_by = str_at(body, "resource.pushedBy.uniqueName")?;
        let repository = str_at(body, "resource.repository.name")?;
        let git_ref = str_at(body, "resource.refUpdates.0.name")?;

        for entry in &settings.watch {
            if entry.remote_user.as_str() == pushed_by
                && entry.remote_repo.as_str() == repository
                && entry.remote_branch.to_ref() == git_ref
            {
                debug!(repo = %entry.remote_repo, branch = %entry.remote_branch, "Azure DevOps webhook matched watch entry");
                return DeployIntent::from_watch_entry(Provider::AzureDevOps, settings, entry)
                    .map(Some);
            }
        }

        debug!(%pushed_by, %repository, %git_ref, "Azure DevOps webhook matched no watch entry");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::normalize::tests::entry;
    use crate::types::RemoteRef;

    const TEMPLATE: &str = "ssh://me@vs-ssh.visualstudio.com:22/proj/_ssh/";

    fn settings() -> ProviderSettings {
        let mut demo = entry("chad@example.com", "demo", "master", "/srv/demo");
        demo.ssh_url_template = Some(TEMPLATE.into());
        ProviderSettings {
            allowed_networks: Vec::new(),
            ssh_account: "me@vs-ssh.visualstudio.com".into(),
            watch: vec![demo],
        }
    }

    fn push(pusher: &str, git_ref: &str) -> Value {
        json!({
            "publisherId": "tfs",
            "resourceContainers": { "project": { "id": "p" } },
            "resource": {
                "pushedBy": { "uniqueName": pusher },
                "repository": { "name": "demo" },
                "refUpdates": [{ "name": git_ref, "oldObjectId": "0", "newObjectId": "1" }]
            }
        })
    }

    #[test]
    fn match_builds_url_from_template() {
        let intent = AzureDevOpsNormalizer
            .normalize(&push("chad@example.com", "refs/heads/master"), &settings())
            .unwrap()
            .unwrap();
        assert_eq!(
            intent.remote_ref(),
            &RemoteRef::Url(format!("{TEMPLATE}demo"))
        );
        assert_eq!(intent.repo_name().as_str(), "demo");
    }

    #[test]
    fn other_pusher_or_branch_does_not_match() {
        let settings = settings();
        assert!(AzureDevOpsNormalizer
            .normalize(&push("eve@example.com", "refs/heads/master"), &settings)
            .unwrap()
            .is_none());
        assert!(AzureDevOpsNormalizer
            .normalize(&push("chad@example.com", "refs/heads/dev"), &settings)
            .unwrap()
            .is_none());
    }

    #[test]
    fn empty_ref_updates_is_malformed() {
        let mut body = push("chad@example.com", "refs/heads/master");
        body["resource"]["refUpdates"] = json!([]);
        assert_eq!(
            AzureDevOpsNormalizer.normalize(&body, &settings()).unwrap_err(),
            DeployError::malformed("missing field 'resource.refUpdates.0.name'")
        );
    }

    #[test]
    fn entry_without_template_is_a_configuration_error() {
        let mut settings = settings();
        settings.watch[0].ssh_url_template = None;
        let err = AzureDevOpsNormalizer
            .normalize(&push("chad@example.com", "refs/heads/master"), &settings)
            .unwrap_err();
        assert!(matches!(err, DeployError::Configuration { .. }));
    }
}
