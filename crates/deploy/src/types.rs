//! Canonical value types shared by every crate in the workspace.
//!
//! [`DeployIntent`] is the single record the provider normalizers produce and
//! the sync engine consumes. [`SyncOutcome`] is what the sync engine hands back
//! for logging and notification.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ProviderSettings, WatchEntry};
use crate::errors::DeployError;
use crate::identifiers::{BranchName, RemoteUser, RepoName};

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// A source-control provider whose push webhooks are understood.
///
/// The serialised names match the provider keys in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// GitHub push events.
    #[serde(rename = "github")]
    GitHub,
    /// Bitbucket Cloud `repo:push` events.
    Bitbucket,
    /// Azure DevOps (formerly VSTS) `git.push` service hook events.
    #[serde(rename = "vsts", alias = "azure_devops")]
    AzureDevOps,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GitHub => write!(f, "GitHub"),
            Self::Bitbucket => write!(f, "Bitbucket"),
            Self::AzureDevOps => write!(f, "Azure DevOps"),
        }
    }
}

// ---------------------------------------------------------------------------
// Remote addressing
// ---------------------------------------------------------------------------

/// How to reach the remote repository for a deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RemoteRef {
    /// scp-style SSH addressing: `<ssh_account>:<repo_user>/<repo_name>.git`.
    ///
    /// Used by GitHub and Bitbucket.
    Account {
        /// SSH login and host, e.g. `git@github.com`.
        ssh_account: String,
        /// Owner of the repository.
        repo_user: RemoteUser,
        /// Repository name.
        repo_name: RepoName,
    },
    /// A complete URL built from a configured template plus the repository name.
    ///
    /// Used by Azure DevOps, whose SSH endpoints do not follow the
    /// `account:user/repo.git` scheme.
    Url(String),
}

impl RemoteRef {
    /// Returns the URL passed to `git remote add`.
    pub fn url(&self) -> String {
        match self {
            Self::Account {
                ssh_account,
                repo_user,
                repo_name,
            } => format!("{ssh_account}:{repo_user}/{repo_name}.git"),
            Self::Url(url) => url.clone(),
        }
    }
}

impl std::fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url())
    }
}

// ---------------------------------------------------------------------------
// Deploy intent
// ---------------------------------------------------------------------------

/// A validated request to bring `local_dir` in line with `branch` on the remote.
///
/// Only constructed by the provider normalizers, and only after a payload has
/// matched a configured [`WatchEntry`]. All fields are populated; there is no
/// partially built intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployIntent {
    provider: Provider,
    remote_ref: RemoteRef,
    repo_name: RepoName,
    branch: BranchName,
    local_dir: PathBuf,
}

impl DeployIntent {
    /// Builds the intent for a matched watch entry.
    ///
    /// Fails only when an Azure DevOps entry has no SSH URL template, which
    /// configuration validation rejects at startup.
    pub(crate) fn from_watch_entry(
        provider: Provider,
        settings: &ProviderSettings,
        entry: &WatchEntry,
    ) -> Result<Self, DeployError> {
        let remote_ref = match provider {
            Provider::AzureDevOps => {
                let template = entry.ssh_url_template.as_deref().ok_or_else(|| {
                    DeployError::Configuration {
                        message: format!(
                            "watch entry for '{}' has no ssh_url_template",
                            entry.remote_repo
                        ),
                    }
                })?;
                RemoteRef::Url(format!("{template}{}", entry.remote_repo))
            }
            Provider::GitHub | Provider::Bitbucket => RemoteRef::Account {
                ssh_account: settings.ssh_account.clone(),
                repo_user: entry.remote_user.clone(),
                repo_name: entry.remote_repo.clone(),
            },
        };

        Ok(Self {
            provider,
            remote_ref,
            repo_name: entry.remote_repo.clone(),
            branch: entry.remote_branch.clone(),
            local_dir: entry.local_dir.clone(),
        })
    }

    /// The provider whose webhook produced this intent.
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// How to reach the remote repository.
    pub fn remote_ref(&self) -> &RemoteRef {
        &self.remote_ref
    }

    /// The remote repository name.
    pub fn repo_name(&self) -> &RepoName {
        &self.repo_name
    }

    /// The branch to synchronise.
    pub fn branch(&self) -> &BranchName {
        &self.branch
    }

    /// The absolute path of the deploy destination.
    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }
}

// ---------------------------------------------------------------------------
// Sync outcome
// ---------------------------------------------------------------------------

/// A git-level step performed by the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    /// Created the deploy directory.
    CreateDir,
    /// `git init`.
    Init,
    /// `git remote add origin <url>`, on first sync or when `origin` is missing.
    RemoteAdd,
    /// `git fetch origin`.
    Fetch,
    /// `git checkout -b <branch> origin/<branch>`.
    Checkout,
    /// `git pull origin refs/heads/<branch>`.
    Pull,
}

impl std::fmt::Display for SyncStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CreateDir => "create-dir",
            Self::Init => "init",
            Self::RemoteAdd => "remote-add",
            Self::Fetch => "fetch",
            Self::Checkout => "checkout",
            Self::Pull => "pull",
        };
        f.write_str(name)
    }
}

/// Result of one sync, kept for the audit log and the notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// `true` when every step exited successfully.
    pub succeeded: bool,

    /// Combined stdout/stderr of the git invocations, in execution order.
    pub log_text: String,

    /// Steps that were attempted, in order. The last step is the one that
    /// failed when `succeeded` is `false`.
    pub steps: Vec<SyncStep>,

    /// When the sync acquired the directory lock and started work.
    pub started_at: Timestamp,

    /// When the sync finished (successfully, with an error, or by timeout).
    pub finished_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
