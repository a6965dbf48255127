use serde_json::Value;
use tracing::debug;

use super::{str_at, ProviderNormalizer};
use crate::config::ProviderSettings;
use crate::errors::DeployError;
use crate::types::{DeployIntent, Provider};

/// GitHub `push` events.
///
/// An entry matches when its `remote_user` is the sender's login or the
/// owning organisation's login, its repository is `repository.name`, and
/// `refs/heads/<remote_branch>` equals `ref`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitHubNormalizer;

impl ProviderNormalizer for GitHubNormalizer {
    fn normalize(
        &self,
        body: &Value,
        settings: &ProviderSettings,
    ) -> Result<Option<DeployIntent>, DeployError> {
        let sender = str_at(body, "sender.login")?;
        let repository = str_at(body, "repository.name")?;
        let git_ref = str_at(body, "ref")?;

        for entry in &settings.watch {
            if entry.remote_repo.as_str() != repository || entry.remote_branch.to_ref() != git_ref {
                continue;
            }
            let user = entry.remote_user.as_str();
            if user == sender || organization_login(body)? == Some(user) {
                debug!(repo = %entry.remote_repo, branch = %entry.remote_branch, "GitHub webhook matched watch entry");
                return DeployIntent::from_watch_entry(Provider::GitHub, settings, entry).map(Some);
            }
        }

        debug!(%sender, %repository, %git_ref, "GitHub webhook matched no watch entry");
        Ok(None)
    }
}

/// `organization.login`; pushes to personal repositories carry no organization.
///
/// Only read when the sender did not already match.
fn organization_login(body: &Value) -> Result<Option<&str>, DeployError> {
    match body.get("organization") {
        None | Some(Value::Null) => Ok(None),
        Some(_) => str_at(body, "organization.login").map(Some),
    }
}
