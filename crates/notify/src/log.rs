//! Notification that only writes to the service log.

use async_trait::async_trait;
use deploy::{DeployIntent, NotificationSink, NotifyError, SyncOutcome};
use tracing::{info, warn};

use crate::message;

/// Logs the notification instead of sending it. Used when e-mail is disabled.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    host: String,
}

impl LogNotifier {
    /// Creates a log notifier; `host` is resolved like the e-mail subject host.
    pub fn new(host: Option<&str>) -> Self {
        Self {
            host: message::resolve_host(host),
        }
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(
        &self,
        intent: &DeployIntent,
        outcome: &SyncOutcome,
    ) -> Result<(), NotifyError> {
        let subject = message::subject(&self.host, intent, outcome);
        if outcome.succeeded {
            info!(%subject, dir = %intent.local_dir().display(), "deploy notification");
        } else {
            warn!(%subject, dir = %intent.local_dir().display(), output = %outcome.log_text, "deploy notification");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::tests::{intent, outcome};

    #[tokio::test]
    async fn never_fails() {
        let notifier = LogNotifier::new(Some("web1"));
        assert!(notifier.notify(&intent(), &outcome(true)).await.is_ok());
        assert!(notifier.notify(&intent(), &outcome(false)).await.is_ok());
    }
}
