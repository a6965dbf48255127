//! Git working-directory synchronisation.
//!
//! Implements the [`deploy::RepoSynchronizer`] trait by driving the `git`
//! binary as a structured subprocess: argument lists, an explicit working
//! directory, and captured stdout/stderr/exit status for every call.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Process spawning, filesystem checks, per-directory
//! locking, and timeouts live here. The [`deploy`] crate sees only
//! [`deploy::RepoSynchronizer`] and [`deploy::SyncOutcome`].
//!
//! ## Guarantees
//!
//! - Two syncs of the same directory never interleave (see [`DirLocks`]).
//! - A sync never runs longer than [`SyncSettings::timeout`]; the running git
//!   child is killed on expiry.
//! - A failed first-time initialization leaves no `.git` behind, so a
//!   redelivered webhook starts over cleanly.

mod engine;
mod git;
mod locks;

pub use engine::{RepoSyncEngine, SyncSettings, DEFAULT_SYNC_TIMEOUT};
pub use git::GitError;
pub use locks::DirLocks;
