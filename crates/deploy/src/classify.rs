//! Payload classification: which provider produced a decoded webhook body.
//!
//! The three push payload shapes overlap (all of them carry `repository`), so
//! the rules below are evaluated strictly in order and the first match wins.

use serde_json::{Map, Value};

use crate::errors::DeployError;
use crate::types::Provider;

/// What a webhook body turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// A push event from a supported provider.
    Provider(Provider),
    /// Push-adjacent, but without commit content (e.g. branch delete, tag).
    NonActionable,
    /// Not a shape any supported provider produces.
    Unrecognized,
}

/// Classifies a decoded webhook body.
///
/// Rules, first match wins:
///
/// 1. `resourceContainers` and `resource` present → Azure DevOps.
/// 2. no `commits`, and `repository` has no `commits_url` → non-actionable.
/// 3. `head_commit`, `pusher`, `repository`, `sender` present → GitHub.
/// 4. `actor`, `repository`, `push` present → Bitbucket.
/// 5. otherwise unrecognised.
///
/// Returns [`DeployError::MalformedPayload`] when the body is not a JSON
/// object, or when rule 2 needs `repository` and it is missing or not an
/// object.
pub fn classify(body: &Value) -> Result<Classification, DeployError> {
    let object = body
        .as_object()
        .ok_or_else(|| DeployError::malformed("payload is not a JSON object"))?;

    if has_all(object, &["resourceContainers", "resource"]) {
        return Ok(Classification::Provider(Provider::AzureDevOps));
    }

    if !object.contains_key("commits") {
        let repository = object
            .get("repository")
            .ok_or_else(|| DeployError::malformed("missing field 'repository'"))?
            .as_object()
            .ok_or_else(|| DeployError::malformed("field 'repository' is not an object"))?;
        if !repository.contains_key("commits_url") {
            return Ok(Classification::NonActionable);
        }
    }

    if has_all(object, &["head_commit", "pusher", "repository", "sender"]) {
        return Ok(Classification::Provider(Provider::GitHub));
    }

    if has_all(object, &["actor", "repository", "push"]) {
        return Ok(Classification::Provider(Provider::Bitbucket));
    }

    Ok(Classification::Unrecognized)
}

fn has_all(object: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter().all(|key| object.contains_key(*key))
}
