//! hookdeploy entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: load the TOML file named by `--config` (or
//!    `HOOKDEPLOY_CONFIG`) and validate it.
//! 2. **Wire observability**: install the `tracing-subscriber` stack described
//!    in [`telemetry`].
//! 3. **Construct infrastructure**: a [`gitsync::RepoSyncEngine`] and either a
//!    [`notify::MailgunNotifier`] or a [`notify::LogNotifier`], injected into a
//!    [`listener::WebhookGateway`].
//! 4. **Serve** until Ctrl-C or SIGTERM, then drain in-flight requests.
//!
//! `--check` stops after step 1 and reports what was loaded.

mod config;
mod telemetry;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use deploy::{NotificationSink, RepoSynchronizer};
use gitsync::RepoSyncEngine;
use listener::WebhookGateway;
use notify::{LogNotifier, MailgunNotifier};
use tracing::{info, warn};

use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(name = "hookdeploy")]
#[command(version, about = "Deploys git branches to local directories when push webhooks arrive")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "HOOKDEPLOY_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Listen address, overriding `[server] bind`
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    if cli.check {
        println!(
            "{}: OK ({} provider(s), {} watch entr{})",
            cli.config.display(),
            config.providers.iter().count(),
            config.watch_count(),
            if config.watch_count() == 1 { "y" } else { "ies" },
        );
        return Ok(());
    }

    let _telemetry = telemetry::init(&config.logging, cli.verbose)?;
    run(config, cli.bind).await
}

async fn run(config: AppConfig, bind: Option<SocketAddr>) -> Result<()> {
    let bind = bind.unwrap_or(config.server.bind);

    let synchronizer: Arc<dyn RepoSynchronizer> = Arc::new(RepoSyncEngine::new(config.sync));
    let notifier: Arc<dyn NotificationSink> = match config.email.mailgun() {
        Some(settings) => {
            info!(recipients = settings.to.len(), "e-mail notifications enabled");
            Arc::new(MailgunNotifier::new(settings).context("failed to build mail client")?)
        }
        None => {
            info!("e-mail notifications disabled, logging outcomes only");
            Arc::new(LogNotifier::new(config.email.subject_host.as_deref()))
        }
    };

    for (provider, settings) in config.providers.iter() {
        info!(
            %provider,
            networks = settings.allowed_networks.len(),
            watched = settings.watch.len(),
            "provider configured"
        );
    }

    let gateway = WebhookGateway::new(Arc::new(config.providers), synchronizer, notifier);
    let tcp = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    listener::serve(tcp, gateway, shutdown_signal())
        .await
        .context("webhook server failed")?;

    info!("shut down");
    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM where signals exist.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl-C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
