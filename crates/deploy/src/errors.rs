//! Error types for the deploy-hook domain.
//!
//! [`DeployError`] covers every reason a webhook delivery does not end in a
//! successful sync. All of them are resolved at the HTTP boundary: the
//! provider always receives `200 OK` with an `"OK"` or `"ERROR"` body, so
//! none of these conditions triggers a provider-side retry.
//!
//! [`NotifyError`] is produced by [`crate::NotificationSink`] implementations
//! and is only ever logged.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Provider;

// ---------------------------------------------------------------------------
// Delivery errors
// ---------------------------------------------------------------------------

/// Reasons a webhook delivery was rejected, skipped, or failed to deploy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeployError {
    /// The peer address is not inside any provider's allowlist.
    ///
    /// The request is rejected before its body is read.
    #[error("Unauthorized peer address: {peer}")]
    Unauthorized {
        /// The peer address as seen by the listener.
        peer: String,
    },

    /// The body could not be decoded, or a field required by the classifier
    /// or a normalizer is missing or has the wrong type.
    #[error("Malformed payload: {reason}")]
    MalformedPayload {
        /// What was missing or wrong (e.g. `"missing field 'sender.login'"`).
        reason: String,
    },

    /// The payload shape does not belong to any supported provider.
    #[error("Unable to determine the payload's provider")]
    Unrecognized,

    /// A push-adjacent event with no commit content (branch delete, tag).
    #[error("Payload carries no commits and is not actionable")]
    NonActionable,

    /// A recognised payload that matches no configured watch entry.
    #[error("No {provider} watch entry matches the payload")]
    NoMatch {
        /// Provider the payload was classified as.
        provider: Provider,
    },

    /// A git step exited non-zero, timed out, or the deploy directory could
    /// not be prepared.
    #[error("Sync of {} failed:\n{log}", .local_dir.display())]
    SyncFailed {
        /// The deploy directory that was being synchronised.
        local_dir: PathBuf,
        /// Captured git output up to and including the failing step.
        log: String,
    },

    /// The provider configuration is invalid.
    ///
    /// Produced at load time; the service never starts with an invalid config.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl DeployError {
    /// Creates a [`DeployError::MalformedPayload`].
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors a human should be told about.
    ///
    /// Only a failed sync warrants a notification; everything else is an
    /// operator-log concern.
    pub fn is_actionable_failure(&self) -> bool {
        matches!(self, Self::SyncFailed { .. })
    }
}

// ---------------------------------------------------------------------------
// Notification errors
// ---------------------------------------------------------------------------

/// Errors produced while delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The notification service could not be reached.
    #[error("Notification transport failed: {message}")]
    Transport {
        /// Underlying transport error.
        message: String,
    },

    /// The notification service answered with a non-success status.
    #[error("Notification rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code returned by the service.
        status: u16,
        /// Response body, for the log.
        body: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_sync_failures_are_actionable() {
        let failed = DeployError::SyncFailed {
            local_dir: PathBuf::from("/srv/demo"),
            log: "fatal: couldn't find remote ref dev".into(),
        };
        assert!(failed.is_actionable_failure());
        assert!(!DeployError::NonActionable.is_actionable_failure());
        assert!(!DeployError::NoMatch {
            provider: Provider::GitHub
        }
        .is_actionable_failure());
    }

    #[test]
    fn sync_failure_message_names_directory() {
        let failed = DeployError::SyncFailed {
            local_dir: PathBuf::from("/srv/demo"),
            log: "boom".into(),
        };
        assert_eq!(failed.to_string(), "Sync of /srv/demo failed:\nboom");
    }
}
