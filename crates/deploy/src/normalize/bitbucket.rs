use serde_json::Value;
use tracing::debug;

use super::{str_at, value_at, ProviderNormalizer};
use crate::config::ProviderSettings;
use crate::errors::DeployError;
use crate::types::{DeployIntent, Provider};

/// Bitbucket `repo:push` events.
///
/// `push.changes` is scanned in order. Changes whose `new` side is not a
/// branch, or has no name (deletions), are skipped. Within a change, watch
/// entries are scanned in configured order; an entry matches on repository
/// name, branch name, and `remote_action == new.target.type`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitbucketNormalizer;

impl ProviderNormalizer for BitbucketNormalizer {
    fn normalize(
        &self,
        body: &Value,
        settings: &ProviderSettings,
    ) -> Result<Option<DeployIntent>, DeployError> {
        let changes = value_at(body, "push.changes")?
            .as_array()
            .ok_or_else(|| DeployError::malformed("field 'push.changes' is not an array"))?;

        for change in changes {
            let new = match change.get("new") {
                Some(new) if new.is_object() => new,
                _ => {
                    debug!("change has no new state, skipping");
                    continue;
                }
            };
            let is_branch = new.get("type").and_then(Value::as_str) == Some("branch");
            let branch = new.get("name").and_then(Value::as_str).unwrap_or_default();
            if !is_branch || branch.is_empty() {
                debug!("change was not for a branch or branch name was empty, skipping");
                continue;
            }

            let repository = str_at(new, "repository.name")?;
            let target_type = str_at(new, "target.type")?;

            for entry in &settings.watch {
                if entry.remote_repo.as_str() == repository
                    && entry.remote_branch.as_str() == branch
                    && entry.remote_action == target_type
                {
                    debug!(repo = %entry.remote_repo, branch = %entry.remote_branch, "Bitbucket webhook matched watch entry");
                    return DeployIntent::from_watch_entry(Provider::Bitbucket, settings, entry)
                        .map(Some);
                }
            }
        }

        debug!("Bitbucket webhook matched no watch entry");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::normalize::tests::entry;

    fn settings() -> ProviderSettings {
        let mut demo = entry("alice", "demo", "master", "/srv/demo");
        demo.remote_action = "commit".into();
        let mut staging = entry("alice", "demo", "staging", "/srv/demo-staging");
        staging.remote_action = "commit".into();
        ProviderSettings {
            allowed_networks: Vec::new(),
            ssh_account: "git@bitbucket.org".into(),
            watch: vec![demo, staging],
        }
    }

    fn change(kind: &str, name: &str, repo: &str, target: &str) -> Value {
        json!({
            "new": {
                "type": kind,
                "name": name,
                "repository": { "name": repo },
                "target": { "type": target }
            }
        })
    }

    fn push(changes: Vec<Value>) -> Value {
        json!({ "actor": {}, "repository": {}, "push": { "changes": changes } })
    }

    #[test]
    fn branch_change_matches() {
        let body = push(vec![change("branch", "master", "demo", "commit")]);
        let intent = BitbucketNormalizer.normalize(&body, &settings()).unwrap().unwrap();
        assert_eq!(intent.provider(), Provider::Bitbucket);
        assert_eq!(intent.remote_ref().url(), "git@bitbucket.org:alice/demo.git");
        assert_eq!(intent.branch().as_str(), "master");
    }

    #[test]
    fn tag_changes_are_skipped_even_when_everything_else_matches() {
        let body = push(vec![change("tag", "master", "demo", "commit")]);
        assert!(BitbucketNormalizer.normalize(&body, &settings()).unwrap().is_none());
    }

    #[test]
    fn deletions_are_skipped() {
        let body = push(vec![
            json!({ "new": null, "old": { "type": "branch", "name": "master" } }),
            change("branch", "", "demo", "commit"),
        ]);
        assert!(BitbucketNormalizer.normalize(&body, &settings()).unwrap().is_none());
    }

    #[test]
    fn later_change_can_match() {
        let body = push(vec![
            change("tag", "v1", "demo", "commit"),
            change("branch", "feature", "demo", "commit"),
            change("branch", "staging", "demo", "commit"),
        ]);
        let intent = BitbucketNormalizer.normalize(&body, &settings()).unwrap().unwrap();
        assert_eq!(intent.local_dir().to_str(), Some("/srv/demo-staging"));
    }

    #[test]
    fn target_type_must_equal_configured_action() {
        let body = push(vec![change("branch", "master", "demo", "push")]);
        assert!(BitbucketNormalizer.normalize(&body, &settings()).unwrap().is_none());
    }

    #[test]
    fn missing_changes_is_malformed() {
        let body = json!({ "actor": {}, "repository": {}, "push": {} });
        assert!(matches!(
            BitbucketNormalizer.normalize(&body, &settings()),
            Err(DeployError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn branch_change_without_target_is_malformed() {
        let body = push(vec![json!({
            "new": { "type": "branch", "name": "master", "repository": { "name": "demo" } }
        })]);
        assert!(BitbucketNormalizer.normalize(&body, &settings()).is_err());
    }
}
