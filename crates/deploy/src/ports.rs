//! Port traits implemented by infrastructure crates.
//!
//! The gateway only ever talks to these traits, so tests can substitute
//! recording fakes and the binary can choose concrete adapters at startup.

use async_trait::async_trait;

use crate::errors::NotifyError;
use crate::types::{DeployIntent, SyncOutcome};

/// Brings a local working directory in line with the branch named by an intent.
///
/// Implemented by `gitsync::RepoSyncEngine`.
#[async_trait]
pub trait RepoSynchronizer: Send + Sync {
    /// Synchronises `intent.local_dir()` with `origin/<intent.branch()>`.
    ///
    /// Never fails: every failure is reported through
    /// [`SyncOutcome::succeeded`] together with the captured git output.
    async fn sync(&self, intent: &DeployIntent) -> SyncOutcome;
}

/// Delivers a human-readable message about a completed sync.
///
/// Fire-and-forget from the caller's point of view: errors are logged and
/// dropped, never retried, and never affect the webhook response.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Sends a message describing `outcome` for `intent`.
    async fn notify(&self, intent: &DeployIntent, outcome: &SyncOutcome)
        -> Result<(), NotifyError>;
}
