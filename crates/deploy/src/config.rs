//! Provider configuration: allowlists, SSH accounts, and watched branches.
//!
//! [`ProviderConfig`] is built once at startup (deserialised by the binary from
//! its configuration file), merged with the optional loopback exemption,
//! validated, and then shared read-only by every request.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;

use ipnet::IpNet;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::DeployError;
use crate::identifiers::{BranchName, RemoteUser, RepoName};
use crate::types::Provider;

/// Per-provider settings, keyed by provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderConfig {
    providers: BTreeMap<Provider, ProviderSettings>,
}

/// Settings for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Network ranges webhook deliveries may originate from.
    ///
    /// Entries are CIDR ranges; a bare address is read as a single-host range.
    #[serde(
        default,
        alias = "whitelist_ips",
        deserialize_with = "deserialize_networks"
    )]
    pub allowed_networks: Vec<IpNet>,

    /// SSH login and host used to build scp-style remotes (e.g. `git@github.com`).
    #[serde(default)]
    pub ssh_account: String,

    /// Watched repository/branch pairs, checked in order; the first match wins.
    #[serde(default, alias = "repo_branch")]
    pub watch: Vec<WatchEntry>,
}

/// A configured (repository, branch, local directory) tuple the service may act on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEntry {
    /// Repository owner (GitHub, Bitbucket) or pusher unique name (Azure DevOps).
    #[serde(alias = "remote_repo_user")]
    pub remote_user: RemoteUser,

    /// Remote repository name.
    #[serde(alias = "remote_repo_name")]
    pub remote_repo: RepoName,

    /// Branch to deploy.
    #[serde(alias = "remote_repo_branch")]
    pub remote_branch: BranchName,

    /// Compared against Bitbucket's `new.target.type`.
    #[serde(alias = "remote_repo_action", default = "default_action")]
    pub remote_action: String,

    /// Absolute path of the deploy destination.
    #[serde(alias = "local_repo_dir")]
    pub local_dir: PathBuf,

    /// Azure DevOps SSH URL prefix; the repository name is appended to it.
    #[serde(default, alias = "vsts_ssh_string")]
    pub ssh_url_template: Option<String>,
}

const LOOPBACK_NETWORKS: [&str; 2] = ["127.0.0.0/8", "::1/128"];

fn default_action() -> String {
    "push".to_string()
}

fn deserialize_networks<'de, D>(deserializer: D) -> Result<Vec<IpNet>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    raw.iter()
        .map(|entry| parse_network(entry).map_err(serde::de::Error::custom))
        .collect()
}

/// Parses a CIDR range, or a bare address as a single-host range.
pub fn parse_network(entry: &str) -> Result<IpNet, String> {
    let entry = entry.trim();
    if let Ok(net) = entry.parse::<IpNet>() {
        return Ok(net);
    }
    let addr = entry
        .parse::<IpAddr>()
        .map_err(|_| format!("'{entry}' is not a CIDR range or IP address"))?;
    let prefix = if addr.is_ipv4() { 32 } else { 128 };
    IpNet::new(addr, prefix).map_err(|e| e.to_string())
}

impl ProviderConfig {
    /// Creates a configuration from per-provider settings.
    pub fn new(providers: BTreeMap<Provider, ProviderSettings>) -> Self {
        Self { providers }
    }

    /// Returns the settings for `provider`, if it is configured.
    pub fn settings(&self, provider: Provider) -> Option<&ProviderSettings> {
        self.providers.get(&provider)
    }

    /// Iterates over every configured provider.
    pub fn iter(&self) -> impl Iterator<Item = (Provider, &ProviderSettings)> {
        self.providers.iter().map(|(p, s)| (*p, s))
    }

    /// Returns `true` when no provider is configured.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Appends the loopback ranges to every provider's allowlist.
    ///
    /// Applied once, before the configuration is frozen, when local delivery
    /// (e.g. through a tunnel such as ngrok) must be accepted.
    #[must_use]
    pub fn with_loopback_exemption(mut self) -> Self {
        let loopback: Vec<IpNet> = LOOPBACK_NETWORKS
            .iter()
            .filter_map(|net| net.parse().ok())
            .collect();
        for settings in self.providers.values_mut() {
            for net in &loopback {
                if !settings.allowed_networks.contains(net) {
                    settings.allowed_networks.push(*net);
                }
            }
        }
        self
    }

    /// Checks the invariants the normalizers and the sync engine rely on.
    pub fn validate(&self) -> Result<(), DeployError> {
        for (provider, settings) in self.iter() {
            if matches!(provider, Provider::GitHub | Provider::Bitbucket)
                && !settings.watch.is_empty()
                && settings.ssh_account.is_empty()
            {
                return Err(config_error(format!("{provider}: ssh_account is required")));
            }
            for entry in &settings.watch {
                if !entry.local_dir.is_absolute() {
                    return Err(config_error(format!(
                        "{provider}: local_dir '{}' must be an absolute path",
                        entry.local_dir.display()
                    )));
                }
                if provider == Provider::AzureDevOps
                    && entry.ssh_url_template.as_deref().map_or(true, str::is_empty)
                {
                    return Err(config_error(format!(
                        "{provider}: watch entry for '{}' requires ssh_url_template",
                        entry.remote_repo
                    )));
                }
            }
        }
        Ok(())
    }
}

fn config_error(message: String) -> DeployError {
    DeployError::Configuration { message }
}
