//! The repository synchronisation state machine.
//!
//! States of `local_dir`, as observed at the start of every sync:
//!
//! | Observed state | Actions |
//! |----------------|---------|
//! | absent or no `.git` | create dir, `init`, `remote add origin`, `fetch` |
//! | repo present without `origin` | `remote add origin` |
//! | repo present, branch absent locally | `fetch` (unless just done), `checkout -b <branch> origin/<branch>` |
//! | repo present, branch present | none |
//!
//! All states then converge on `pull origin refs/heads/<branch>`. The local
//! branch lookup and the pull use the full ref, so a tag with the same name
//! never shadows the branch.
//!
//! A first-time initialization that fails or times out is rolled back by
//! removing `.git`, so the next delivery starts from the first row again.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use deploy::{DeployIntent, RepoSynchronizer, SyncOutcome, SyncStep, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::git::{Git, GitOutput};
use crate::locks::DirLocks;

/// Default upper bound on one sync, lock wait excluded.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(60);

/// Tunables for [`RepoSyncEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Upper bound on one sync; expiry is reported as a failed sync.
    #[serde(with = "duration_secs", rename = "timeout_secs")]
    pub timeout: Duration,

    /// Git binary to invoke.
    pub git_binary: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SYNC_TIMEOUT,
            git_binary: "git".to_string(),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Synchronises deploy directories with their remote branches.
///
/// Cheap to clone; clones share the lock table, so they serialise on the
/// same directories.
#[derive(Debug, Clone)]
pub struct RepoSyncEngine {
    git: Git,
    timeout: Duration,
    locks: DirLocks,
}

/// A step that exited non-zero or could not be run.
#[derive(Debug)]
struct StepFailed;

/// Log and step record for one sync.
#[derive(Debug, Default)]
struct SyncRecord {
    log: String,
    steps: Vec<SyncStep>,
    /// Set while `init`, `remote add`, and the first `fetch` are in progress.
    initializing: bool,
}

impl SyncRecord {
    fn note(&mut self, line: impl AsRef<str>) {
        self.log.push_str(line.as_ref());
        if !self.log.ends_with('\n') {
            self.log.push('\n');
        }
    }
}

impl RepoSyncEngine {
    /// Creates an engine with its own lock table.
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            git: Git::new(settings.git_binary),
            timeout: settings.timeout,
            locks: DirLocks::new(),
        }
    }

    /// Brings `intent.local_dir()` in line with `origin/<intent.branch()>`.
    ///
    /// Waits for any other sync of the same directory to finish first. The
    /// returned outcome carries the combined git output and the steps taken.
    #[instrument(
        skip_all,
        fields(dir = %intent.local_dir().display(), branch = %intent.branch(), provider = %intent.provider())
    )]
    pub async fn sync(&self, intent: &DeployIntent) -> SyncOutcome {
        let _guard = self.locks.acquire(intent.local_dir()).await;
        let started_at = Timestamp::now();
        let mut record = SyncRecord::default();

        let converged = tokio::time::timeout(self.timeout, self.converge(intent, &mut record)).await;
        let succeeded = match converged {
            Ok(Ok(())) => {
                info!(steps = ?record.steps, "sync completed");
                true
            }
            Ok(Err(StepFailed)) => {
                error!(steps = ?record.steps, output = %record.log, "sync failed");
                false
            }
            Err(_) => {
                record.note(format!("sync timed out after {}s", self.timeout.as_secs()));
                error!(timeout_secs = self.timeout.as_secs(), steps = ?record.steps, "sync timed out");
                false
            }
        };
        if !succeeded && record.initializing {
            rollback_init(intent.local_dir(), &mut record).await;
        }

        SyncOutcome {
            succeeded,
            log_text: record.log,
            steps: record.steps,
            started_at,
            finished_at: Timestamp::now(),
        }
    }

    async fn converge(&self, intent: &DeployIntent, record: &mut SyncRecord) -> Result<(), StepFailed> {
        let dir = intent.local_dir();
        let branch = intent.branch().as_str();
        let branch_ref = intent.branch().to_ref();
        let remote_url = intent.remote_ref().url();

        // Anything starting with '-' would be parsed by git as an option.
        for (what, value) in [("branch", branch), ("remote", remote_url.as_str())] {
            if value.starts_with('-') {
                record.note(format!("refusing {what} name '{value}'"));
                return Err(StepFailed);
            }
        }

        if !path_exists(dir).await {
            record.steps.push(SyncStep::CreateDir);
            debug!("creating deploy directory");
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                record.note(format!("failed to create {}: {e}", dir.display()));
                return Err(StepFailed);
            }
        }

        let mut fetched = false;
        if path_exists(&dir.join(".git")).await {
            self.ensure_origin(dir, &remote_url, record).await?;
        } else {
            info!(remote = %remote_url, "initializing repository");
            record.initializing = true;
            self.initialize(dir, &remote_url, record).await?;
            record.initializing = false;
            fetched = true;
        }

        if !self.has_local_branch(dir, &branch_ref, record).await? {
            if !fetched {
                self.step(SyncStep::Fetch, dir, &["fetch", "origin"], record).await?;
            }
            info!("checking out branch");
            let upstream = format!("origin/{branch}");
            self.step(
                SyncStep::Checkout,
                dir,
                &["checkout", "-b", branch, &upstream],
                record,
            )
            .await?;
        }

        debug!("pulling");
        self.step(SyncStep::Pull, dir, &["pull", "origin", &branch_ref], record)
            .await
    }

    async fn initialize(
        &self,
        dir: &Path,
        remote_url: &str,
        record: &mut SyncRecord,
    ) -> Result<(), StepFailed> {
        self.step(SyncStep::Init, dir, &["init"], record).await?;
        self.step(
            SyncStep::RemoteAdd,
            dir,
            &["remote", "add", "origin", remote_url],
            record,
        )
        .await?;
        self.step(SyncStep::Fetch, dir, &["fetch", "origin"], record).await
    }

    /// Adds `origin` to a repository that lacks it, as left behind by a first
    /// sync that was interrupted between `init` and `remote add`.
    async fn ensure_origin(
        &self,
        dir: &Path,
        remote_url: &str,
        record: &mut SyncRecord,
    ) -> Result<(), StepFailed> {
        let output = self
            .run(dir, &["remote", "get-url", "origin"], record)
            .await?;
        if output.success {
            return Ok(());
        }
        warn!(remote = %remote_url, "repository has no origin remote, adding it");
        self.step(
            SyncStep::RemoteAdd,
            dir,
            &["remote", "add", "origin", remote_url],
            record,
        )
        .await
    }

    /// Checks for `branch_ref` (`refs/heads/<branch>`) among local refs.
    async fn has_local_branch(
        &self,
        dir: &Path,
        branch_ref: &str,
        record: &mut SyncRecord,
    ) -> Result<bool, StepFailed> {
        let output = self
            .run(dir, &["show-ref", "--verify", "--quiet", branch_ref], record)
            .await?;
        Ok(output.success)
    }

    /// Runs one recorded step; its output always goes to the log.
    async fn step(
        &self,
        step: SyncStep,
        dir: &Path,
        args: &[&str],
        record: &mut SyncRecord,
    ) -> Result<(), StepFailed> {
        record.steps.push(step);
        record.note(format!("$ git {}", args.join(" ")));
        let output = self.run(dir, args, record).await?;
        let text = output.combined();
        if !text.is_empty() {
            record.note(text);
        }
        if output.success {
            Ok(())
        } else {
            let code = output
                .code
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            record.note(format!("git {step} exited with {code}"));
            Err(StepFailed)
        }
    }

    async fn run(
        &self,
        dir: &Path,
        args: &[&str],
        record: &mut SyncRecord,
    ) -> Result<GitOutput, StepFailed> {
        self.git.run(dir, args).await.map_err(|e| {
            record.note(e.to_string());
            StepFailed
        })
    }
}

#[async_trait]
impl RepoSynchronizer for RepoSyncEngine {
    async fn sync(&self, intent: &DeployIntent) -> SyncOutcome {
        RepoSyncEngine::sync(self, intent).await
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Removes a `.git` left behind by a failed first-time initialization, so the
/// next delivery starts again from the uninitialised state.
async fn rollback_init(dir: &Path, record: &mut SyncRecord) {
    record.initializing = false;
    let git_dir = dir.join(".git");
    match tokio::fs::remove_dir_all(&git_dir).await {
        Ok(()) => record.note(format!("removed partially initialized {}", git_dir.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(error = %e, "failed to remove partially initialized repository");
            record.note(format!("failed to remove {}: {e}", git_dir.display()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_parse_timeout_in_seconds() {
        let settings: SyncSettings = serde_json::from_str(r#"{ "timeout_secs": 15 }"#).unwrap();
        assert_eq!(settings.timeout, Duration::from_secs(15));
        assert_eq!(settings.git_binary, "git");
    }

    #[test]
    fn record_lines_are_newline_terminated() {
        let mut record = SyncRecord::default();
        record.note("first");
        record.note("second\n");
        assert_eq!(record.log, "first\nsecond\n");
    }
}
