//! Provider payload normalization.
//!
//! Each supported provider has a [`ProviderNormalizer`] that reads the fields
//! its push payload carries, compares them against the provider's configured
//! [`WatchEntry`](crate::WatchEntry) list, and produces a [`DeployIntent`] for
//! the first matching entry. A payload that matches nothing yields `Ok(None)`;
//! only missing or mistyped fields are errors.
//!
//! [`resolve`] chains classification and normalization into the single call
//! the gateway makes.

mod azure;
mod bitbucket;
mod github;

pub use azure::AzureDevOpsNormalizer;
pub use bitbucket::BitbucketNormalizer;
pub use github::GitHubNormalizer;

use serde_json::Value;
use tracing::{debug, info};

use crate::classify::{classify, Classification};
use crate::config::{ProviderConfig, ProviderSettings};
use crate::errors::DeployError;
use crate::types::{DeployIntent, Provider};

/// Turns one provider's payload into a deploy intent.
pub trait ProviderNormalizer: Send + Sync {
    /// Matches `body` against `settings.watch`, in configured order.
    ///
    /// # Errors
    ///
    /// [`DeployError::MalformedPayload`] when a required field is missing or
    /// has the wrong type.
    fn normalize(
        &self,
        body: &Value,
        settings: &ProviderSettings,
    ) -> Result<Option<DeployIntent>, DeployError>;
}

/// Returns the normalizer for `provider`.
pub fn normalizer_for(provider: Provider) -> &'static dyn ProviderNormalizer {
    match provider {
        Provider::GitHub => &GitHubNormalizer,
        Provider::Bitbucket => &BitbucketNormalizer,
        Provider::AzureDevOps => &AzureDevOpsNormalizer,
    }
}

/// Normalizes a payload already classified as `provider`.
///
/// A provider absent from the configuration watches nothing, so its payloads
/// never match.
pub fn normalize(
    provider: Provider,
    body: &Value,
    config: &ProviderConfig,
) -> Result<Option<DeployIntent>, DeployError> {
    let Some(settings) = config.settings(provider) else {
        debug!(%provider, "provider is not configured");
        return Ok(None);
    };
    normalizer_for(provider).normalize(body, settings)
}

/// Classifies and normalizes a webhook body.
///
/// # Errors
///
/// - [`DeployError::MalformedPayload`] for bodies missing required fields.
/// - [`DeployError::NonActionable`] / [`DeployError::Unrecognized`] when the
///   classifier says there is nothing to deploy.
/// - [`DeployError::NoMatch`] when no watch entry matches.
pub fn resolve(config: &ProviderConfig, body: &Value) -> Result<DeployIntent, DeployError> {
    let provider = match classify(body)? {
        Classification::Provider(provider) => provider,
        Classification::NonActionable => return Err(DeployError::NonActionable),
        Classification::Unrecognized => return Err(DeployError::Unrecognized),
    };
    info!(%provider, "payload classified");

    normalize(provider, body, config)?.ok_or(DeployError::NoMatch { provider })
}

// ---------------------------------------------------------------------------
// Field access
// ---------------------------------------------------------------------------

/// Follows a dotted path (`"resource.refUpdates.0.name"`) into `value`.
pub(crate) fn value_at<'a>(value: &'a Value, path: &str) -> Result<&'a Value, DeployError> {
    let mut current = value;
    for segment in path.split('.') {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = next.ok_or_else(|| DeployError::malformed(format!("missing field '{path}'")))?;
    }
    Ok(current)
}

/// Like [`value_at`], but the value must be a string.
pub(crate) fn str_at<'a>(value: &'a Value, path: &str) -> Result<&'a str, DeployError> {
    value_at(value, path)?
        .as_str()
        .ok_or_else(|| DeployError::malformed(format!("field '{path}' is not a string")))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};

    use serde_json::json;

    use super::*;
    use crate::config::WatchEntry;
    use crate::identifiers::{BranchName, RemoteUser, RepoName};
    use crate::types::RemoteRef;

    pub(crate) fn entry(user: &str, repo: &str, branch: &str, dir: &str) -> WatchEntry {
        WatchEntry {
            remote_user: RemoteUser::new(user).unwrap(),
            remote_repo: RepoName::new(repo).unwrap(),
            remote_branch: BranchName::new(branch).unwrap(),
            remote_action: "push".into(),
            local_dir: PathBuf::from(dir),
            ssh_url_template: None,
        }
    }

    fn github_config() -> ProviderConfig {
        let mut providers = BTreeMap::new();
        providers.insert(
            Provider::GitHub,
            ProviderSettings {
                allowed_networks: Vec::new(),
                ssh_account: "git@github.com".into(),
                watch: vec![entry("alice", "demo", "master", "/srv/demo")],
            },
        );
        ProviderConfig::new(providers)
    }

    fn github_push(git_ref: &str) -> Value {
        json!({
            "ref": git_ref,
            "head_commit": { "id": "0d1a26e67d8f5eaf1f6ba5c57fc3c7d91ac0fd1c" },
            "pusher": { "name": "alice" },
            "sender": { "login": "alice" },
            "commits": [{ "id": "0d1a26e67d8f5eaf1f6ba5c57fc3c7d91ac0fd1c" }],
            "repository": {
                "name": "demo",
                "commits_url": "https://api.github.com/repos/alice/demo/commits{/sha}"
            }
        })
    }

    #[test]
    fn github_push_to_watched_branch_resolves_to_intent() {
        let intent = resolve(&github_config(), &github_push("refs/heads/master")).unwrap();

        assert_eq!(intent.provider(), Provider::GitHub);
        assert_eq!(intent.remote_ref().url(), "git@github.com:alice/demo.git");
        assert!(matches!(intent.remote_ref(), RemoteRef::Account { .. }));
        assert_eq!(intent.repo_name().as_str(), "demo");
        assert_eq!(intent.branch().as_str(), "master");
        assert_eq!(intent.local_dir(), Path::new("/srv/demo"));
    }

    #[test]
    fn github_push_to_other_branch_is_no_match() {
        let err = resolve(&github_config(), &github_push("refs/heads/dev")).unwrap_err();
        assert_eq!(
            err,
            DeployError::NoMatch {
                provider: Provider::GitHub
            }
        );
    }

    #[test]
    fn unconfigured_provider_never_matches() {
        let body = json!({
            "resourceContainers": {},
            "resource": {
                "pushedBy": { "uniqueName": "alice" },
                "repository": { "name": "demo" },
                "refUpdates": [{ "name": "refs/heads/master" }]
            }
        });
        assert_eq!(
            resolve(&github_config(), &body).unwrap_err(),
            DeployError::NoMatch {
                provider: Provider::AzureDevOps
            }
        );
    }

    #[test]
    fn tag_event_is_not_actionable() {
        let body = json!({ "ref": "v2", "ref_type": "tag", "repository": { "name": "demo" } });
        assert_eq!(
            resolve(&github_config(), &body).unwrap_err(),
            DeployError::NonActionable
        );
    }

    #[test]
    fn dotted_paths_walk_objects_and_arrays() {
        let body = json!({ "a": { "b": [{ "c": "deep" }] } });
        assert_eq!(str_at(&body, "a.b.0.c").unwrap(), "deep");
        assert!(str_at(&body, "a.b.1.c").is_err());
        assert!(str_at(&body, "a.b").is_err());
    }
}
