//! Service configuration file.
//!
//! One TOML document with a section per concern. Every section has defaults
//! except `[providers]`, which is what the service exists to act on.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use deploy::{DeployError, ProviderConfig};
use gitsync::SyncSettings;
use notify::MailgunSettings;
use serde::Deserialize;
use thiserror::Error;

/// Path used when neither `--config` nor `HOOKDEPLOY_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/hookdeploy/config.toml";

/// Errors raised while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match the expected shape.
    #[error("cannot parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The file parsed but violates a rule the service depends on.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<DeployError> for ConfigError {
    fn from(e: DeployError) -> Self {
        match e {
            DeployError::Configuration { message } => Self::Invalid(message),
            other => Self::Invalid(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// The whole configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub sync: SyncSettings,
    pub logging: LoggingConfig,
    pub email: EmailConfig,
    pub providers: ProviderConfig,
}

/// `[server]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: SocketAddr,

    /// Adds the loopback ranges to every provider's allowlist.
    pub allow_localhost: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            allow_localhost: true,
        }
    }
}

/// Output format of the console log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// `[logging]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,

    /// Additional log file, written without ANSI colours.
    pub file: Option<PathBuf>,

    /// OTLP gRPC endpoint for span export.
    pub otlp_endpoint: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
            otlp_endpoint: None,
        }
    }
}

/// `[email]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub mailgun_url: String,
    pub api_key: String,
    pub from: String,
    pub to: Vec<String>,
    pub subject_host: Option<String>,
}

impl EmailConfig {
    /// Mailgun settings when e-mail is enabled, `None` otherwise.
    pub fn mailgun(&self) -> Option<MailgunSettings> {
        self.enabled.then(|| MailgunSettings {
            mailgun_url: self.mailgun_url.clone(),
            api_key: self.api_key.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            subject_host: self.subject_host.clone(),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        let missing = [
            ("mailgun_url", self.mailgun_url.trim().is_empty()),
            ("api_key", self.api_key.trim().is_empty()),
            ("from", self.from.trim().is_empty()),
            ("to", self.to.iter().all(|to| to.trim().is_empty())),
        ];
        match missing.iter().find(|(_, is_missing)| *is_missing) {
            Some((field, _)) => Err(ConfigError::Invalid(format!(
                "email is enabled but email.{field} is not set"
            ))),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Reads, parses, and validates `path`.
    ///
    /// The loopback exemption is merged into the provider ranges here, so the
    /// returned configuration is ready to freeze.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        if config.server.allow_localhost {
            config.providers = config.providers.with_loopback_exemption();
        }
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.providers.is_empty() {
            return Err(ConfigError::Invalid(
                "no [providers] are configured".to_string(),
            ));
        }
        self.providers.validate()?;
        self.email.validate()
    }

    /// Total number of watch entries across providers.
    pub fn watch_count(&self) -> usize {
        self.providers
            .iter()
            .map(|(_, settings)| settings.watch.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use deploy::{AddressAllowlist, Provider};

    use super::*;

    const MINIMAL: &str = r#"
        [providers.github]
        allowed_networks = ["192.30.252.0/22"]
        ssh_account = "git@github.com"

        [[providers.github.watch]]
        remote_user = "alice"
        remote_repo = "demo"
        remote_branch = "master"
        local_dir = "/srv/demo"
    "#;

    #[test]
    fn minimal_file_uses_defaults() {
        let config = AppConfig::from_toml(MINIMAL).unwrap();

        assert_eq!(config.server.bind, SocketAddr::from(([0, 0, 0, 0], 8000)));
        assert!(config.server.allow_localhost);
        assert_eq!(config.sync.timeout, Duration::from_secs(60));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.email.mailgun().is_none());
        assert_eq!(config.watch_count(), 1);
    }

    #[test]
    fn loopback_is_allowed_by_default() {
        let config = AppConfig::from_toml(MINIMAL).unwrap();
        let allowlist = AddressAllowlist::from_config(&config.providers);

        assert!(allowlist.is_authorized_str("127.0.0.1"));
        assert!(allowlist.is_authorized_str("::1"));
        assert!(allowlist.is_authorized_str("192.30.252.1"));
    }

    #[test]
    fn loopback_exemption_can_be_disabled() {
        let text = format!("[server]\nallow_localhost = false\n{MINIMAL}");
        let config = AppConfig::from_toml(&text).unwrap();
        let allowlist = AddressAllowlist::from_config(&config.providers);

        assert!(!allowlist.is_authorized_str("127.0.0.1"));
    }

    #[test]
    fn full_file_parses_every_section() {
        let text = format!(
            r#"
            [server]
            bind = "127.0.0.1:9000"

            [sync]
            timeout_secs = 5

            [logging]
            level = "debug"
            format = "json"
            file = "/var/log/hookdeploy.log"

            [email]
            enabled = true
            mailgun_url = "https://api.mailgun.net/v3/example.com/messages"
            api_key = "key-123"
            from = "Server <server@example.com>"
            to = ["ops@example.com"]

            [providers.vsts]
            allowed_networks = ["13.107.6.0/24"]

            [[providers.vsts.watch]]
            remote_user = "chad@example.com"
            remote_repo = "site"
            remote_branch = "main"
            local_dir = "/srv/site"
            ssh_url_template = "ssh://me@vs-ssh.visualstudio.com:22/proj/_ssh/"
            {MINIMAL}
            "#
        );
        let config = AppConfig::from_toml(&text).unwrap();

        assert_eq!(config.server.bind.port(), 9000);
        assert_eq!(config.sync.timeout, Duration::from_secs(5));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.email.mailgun().unwrap().to, vec!["ops@example.com"]);
        assert!(config.providers.settings(Provider::AzureDevOps).is_some());
        assert_eq!(config.watch_count(), 2);
    }

    #[test]
    fn shipped_example_is_valid() {
        let config =
            AppConfig::from_toml(include_str!("../../../hookdeploy.example.toml")).unwrap();
        assert_eq!(config.providers.iter().count(), 3);
        assert_eq!(config.watch_count(), 3);
    }

    #[test]
    fn enabled_email_requires_recipients() {
        let text = format!(
            "[email]\nenabled = true\nmailgun_url = \"https://m\"\napi_key = \"k\"\nfrom = \"f\"\n{MINIMAL}"
        );
        let err = AppConfig::from_toml(&text).unwrap_err();
        assert!(err.to_string().contains("email.to"), "{err}");
    }

    #[test]
    fn relative_local_dir_is_rejected() {
        let text = MINIMAL.replace("/srv/demo", "srv/demo");
        assert!(matches!(
            AppConfig::from_toml(&text),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn file_without_providers_is_rejected() {
        assert!(matches!(
            AppConfig::from_toml("[server]\nbind = \"0.0.0.0:8000\"\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn load_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));

        std::fs::write(&path, "[server\n").unwrap();
        let err = AppConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"), "{err}");

        std::fs::write(&path, MINIMAL).unwrap();
        assert!(AppConfig::load(&path).is_ok());
    }
}
