//! E-mail notification through the Mailgun messages API.

use std::time::Duration;

use async_trait::async_trait;
use deploy::{DeployIntent, NotificationSink, NotifyError, SyncOutcome};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::message;

/// Request timeout for the mail relay; a slow relay must not hold a webhook.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection details for the Mailgun messages endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailgunSettings {
    /// Full messages URL, e.g. `https://api.mailgun.net/v3/<domain>/messages`.
    pub mailgun_url: String,

    /// API key; sent as the password of HTTP basic auth user `api`.
    pub api_key: String,

    /// `From` header, e.g. `Server <server@example.com>`.
    pub from: String,

    /// Recipients.
    pub to: Vec<String>,

    /// Host name shown in subjects; defaults to `$HOSTNAME`.
    #[serde(default)]
    pub subject_host: Option<String>,
}

/// Sends one e-mail per completed sync.
#[derive(Debug, Clone)]
pub struct MailgunNotifier {
    client: reqwest::Client,
    settings: MailgunSettings,
    host: String,
}

impl MailgunNotifier {
    /// Creates a notifier with its own HTTP client.
    pub fn new(settings: MailgunSettings) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Transport {
                message: e.to_string(),
            })?;
        let host = message::resolve_host(settings.subject_host.as_deref());
        Ok(Self {
            client,
            settings,
            host,
        })
    }
}

#[async_trait]
impl NotificationSink for MailgunNotifier {
    #[instrument(skip_all, fields(repo = %intent.repo_name(), succeeded = outcome.succeeded))]
    async fn notify(
        &self,
        intent: &DeployIntent,
        outcome: &SyncOutcome,
    ) -> Result<(), NotifyError> {
        let subject = message::subject(&self.host, intent, outcome);
        let text = message::body(intent, outcome);

        let mut form: Vec<(&str, &str)> = vec![("from", self.settings.from.as_str())];
        form.extend(self.settings.to.iter().map(|to| ("to", to.as_str())));
        form.push(("subject", subject.as_str()));
        form.push(("text", text.as_str()));

        let response = self
            .client
            .post(&self.settings.mailgun_url)
            .basic_auth("api", Some(&self.settings.api_key))
            .form(&form)
            .send()
            .await
            .map_err(|e| NotifyError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(%subject, "notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Form, Router};

    use super::*;
    use crate::message::tests::{intent, outcome};

    type Captured = Arc<Mutex<Vec<(Option<String>, Vec<(String, String)>)>>>;

    async fn spawn_relay(status: StatusCode) -> (SocketAddr, Captured) {
        let captured: Captured = Arc::default();
        let app = Router::new()
            .route(
                "/v3/example.com/messages",
                post(
                    move |State(captured): State<Captured>,
                          headers: HeaderMap,
                          Form(fields): Form<Vec<(String, String)>>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        captured.lock().unwrap().push((auth, fields));
                        (status, "queued")
                    },
                ),
            )
            .with_state(Arc::clone(&captured));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, captured)
    }

    fn settings(addr: SocketAddr) -> MailgunSettings {
        MailgunSettings {
            mailgun_url: format!("http://{addr}/v3/example.com/messages"),
            api_key: "key-123".into(),
            from: "Server <server@example.com>".into(),
            to: vec!["ops@example.com".into(), "dev@example.com".into()],
            subject_host: Some("web1".into()),
        }
    }

    #[tokio::test]
    async fn posts_form_with_basic_auth() {
        let (addr, captured) = spawn_relay(StatusCode::OK).await;
        let notifier = MailgunNotifier::new(settings(addr)).unwrap();

        notifier.notify(&intent(), &outcome(true)).await.unwrap();

        let captured = captured.lock().unwrap();
        let (auth, fields) = &captured[0];
        // base64("api:key-123")
        assert_eq!(auth.as_deref(), Some("Basic YXBpOmtleS0xMjM="));
        let recipients: Vec<_> = fields.iter().filter(|(k, _)| k == "to").collect();
        assert_eq!(recipients.len(), 2);
        assert!(fields
            .iter()
            .any(|(k, v)| k == "subject" && v == "web1 - git pull - demo"));
        assert!(fields
            .iter()
            .any(|(k, v)| k == "text" && v.contains("Already up to date.")));
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let (addr, _) = spawn_relay(StatusCode::UNAUTHORIZED).await;
        let notifier = MailgunNotifier::new(settings(addr)).unwrap();

        let err = notifier.notify(&intent(), &outcome(false)).await.unwrap_err();
        assert!(matches!(err, NotifyError::Rejected { status: 401, .. }));
    }

    #[tokio::test]
    async fn unreachable_relay_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let notifier = MailgunNotifier::new(settings(addr)).unwrap();

        let err = notifier.notify(&intent(), &outcome(true)).await.unwrap_err();
        assert!(matches!(err, NotifyError::Transport { .. }));
    }
}
