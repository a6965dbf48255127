//! Webhook delivery handling, independent of the HTTP framework.

use std::net::IpAddr;
use std::sync::Arc;

use deploy::{
    AddressAllowlist, DeployError, DeployIntent, NotificationSink, ProviderConfig,
    RepoSynchronizer, SyncOutcome,
};
use serde_json::Value;
use tracing::{debug, error, info, warn, Instrument};

use crate::body::decode_body;

/// Text body returned to the provider.
///
/// Every handled request gets `200 OK`; only the body distinguishes a
/// rejected peer, so providers never retry because of a failed deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookReply {
    /// The request was accepted (whether or not it led to a deploy).
    Ok,
    /// The peer address is not authorised.
    Error,
}

impl WebhookReply {
    /// The literal response body.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Error => "ERROR",
        }
    }
}

/// Receives webhook deliveries and drives classification, sync, and notification.
///
/// Cheap to clone; all clones share the same configuration and adapters.
#[derive(Clone)]
pub struct WebhookGateway {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<ProviderConfig>,
    allowlist: AddressAllowlist,
    synchronizer: Arc<dyn RepoSynchronizer>,
    notifier: Arc<dyn NotificationSink>,
}

impl WebhookGateway {
    /// Creates a gateway over a frozen configuration and its adapters.
    pub fn new(
        config: Arc<ProviderConfig>,
        synchronizer: Arc<dyn RepoSynchronizer>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let allowlist = AddressAllowlist::from_config(&config);
        if allowlist.is_empty() {
            warn!("no provider allows any network, every webhook will be rejected");
        } else {
            info!(ranges = allowlist.len(), "peer allowlist built");
        }
        Self {
            inner: Arc::new(Inner {
                config,
                allowlist,
                synchronizer,
                notifier,
            }),
        }
    }

    /// Checks `peer` against the allowlist; logs and rejects outsiders.
    pub fn authorize(&self, peer: IpAddr) -> Result<(), DeployError> {
        match self.inner.allowlist.first_matching_provider(peer) {
            Some(provider) => {
                debug!(range_of = %provider, "peer address validated");
                Ok(())
            }
            None => {
                let rejection = DeployError::Unauthorized {
                    peer: peer.to_string(),
                };
                warn!(%rejection, "rejecting webhook");
                Err(rejection)
            }
        }
    }

    /// Handles one POSTed delivery from `peer`.
    ///
    /// The peer is checked before the body is looked at. Everything after that
    /// ends in [`WebhookReply::Ok`], whatever the deploy outcome.
    ///
    /// The sync runs on its own task. If the caller stops waiting (the
    /// provider hangs up), the sync and its notification still complete.
    pub async fn handle(
        &self,
        peer: IpAddr,
        content_type: Option<&str>,
        body: &[u8],
    ) -> WebhookReply {
        if self.authorize(peer).is_err() {
            return WebhookReply::Error;
        }

        let payload = match decode_body(content_type, body) {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                info!(?content_type, "request was not recognized, no action taken");
                return WebhookReply::Ok;
            }
            Err(e) => {
                log_rejection(&e);
                return WebhookReply::Ok;
            }
        };

        let intent = match self.match_intent(&payload) {
            Ok(intent) => intent,
            Err(e) => {
                log_rejection(&e);
                return WebhookReply::Ok;
            }
        };

        let gateway = self.clone();
        let deploy = tokio::spawn(
            async move {
                if let Err(e) = gateway.deploy(intent).await {
                    log_rejection(&e);
                }
            }
            .in_current_span(),
        );
        if let Err(e) = deploy.await {
            error!(error = %e, "deploy task did not complete");
        }
        WebhookReply::Ok
    }

    fn match_intent(&self, payload: &Value) -> Result<DeployIntent, DeployError> {
        let intent = deploy::resolve(&self.inner.config, payload)?;
        info!(
            provider = %intent.provider(),
            repo = %intent.repo_name(),
            branch = %intent.branch(),
            dir = %intent.local_dir().display(),
            "webhook matched, synchronizing"
        );
        Ok(intent)
    }

    async fn deploy(&self, intent: DeployIntent) -> Result<SyncOutcome, DeployError> {
        let outcome = self.inner.synchronizer.sync(&intent).await;
        self.notify_detached(intent.clone(), outcome.clone());

        if outcome.succeeded {
            info!(dir = %intent.local_dir().display(), "deploy completed");
            Ok(outcome)
        } else {
            Err(DeployError::SyncFailed {
                local_dir: intent.local_dir().to_path_buf(),
                log: outcome.log_text,
            })
        }
    }

    /// Sends the notification on its own task; failures are logged and dropped.
    fn notify_detached(&self, intent: DeployIntent, outcome: SyncOutcome) {
        let notifier = Arc::clone(&self.inner.notifier);
        tokio::spawn(
            async move {
                if let Err(e) = notifier.notify(&intent, &outcome).await {
                    warn!(error = %e, "notification failed, dropping");
                }
            }
            .in_current_span(),
        );
    }
}

fn log_rejection(e: &DeployError) {
    if e.is_actionable_failure() {
        error!(error = %e, "deploy failed");
        return;
    }
    match e {
        DeployError::NonActionable | DeployError::Unrecognized | DeployError::NoMatch { .. } => {
            info!(reason = %e, "no action taken")
        }
        _ => warn!(error = %e, "no action taken"),
    }
}
