//! Structured `git` invocation.
//!
//! Arguments are passed as a list, never through a shell, so branch and
//! repository names from webhook payloads cannot inject commands.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::trace;

/// Errors starting a git process. A git process that runs and exits non-zero
/// is not an error at this level; see [`GitOutput::success`].
#[derive(Debug, Error)]
pub enum GitError {
    /// The git binary could not be spawned (not installed, not executable,
    /// or the working directory vanished).
    #[error("failed to run {binary} in {dir}: {source}")]
    Spawn {
        /// Git binary that was invoked.
        binary: String,
        /// Working directory of the invocation.
        dir: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of one git invocation.
#[derive(Debug, Clone)]
pub(crate) struct GitOutput {
    pub(crate) success: bool,
    pub(crate) code: Option<i32>,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

impl GitOutput {
    /// stdout followed by stderr, as one block for the audit log.
    pub(crate) fn combined(&self) -> String {
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len());
        text.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stdout.ends_with('\n') && !self.stderr.is_empty() {
            text.push('\n');
        }
        text.push_str(&self.stderr);
        text
    }
}

/// Runs git subcommands with an explicit working directory.
#[derive(Debug, Clone)]
pub(crate) struct Git {
    binary: PathBuf,
}

impl Git {
    pub(crate) fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Runs `git <args>` in `dir`, capturing stdout, stderr, and exit status.
    ///
    /// The child is killed if the returned future is dropped, so a sync that
    /// times out does not leave git running against the working tree.
    pub(crate) async fn run(&self, dir: &Path, args: &[&str]) -> Result<GitOutput, GitError> {
        trace!(dir = %dir.display(), ?args, "running git");
        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| GitError::Spawn {
                binary: self.binary.display().to_string(),
                dir: dir.display().to_string(),
                source,
            })?;

        Ok(GitOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
