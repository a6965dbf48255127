//! Per-directory mutual exclusion.
//!
//! A git working tree is not safe for concurrent writers, so every sync holds
//! the lock for its `local_dir` from the first step to the last. Syncs for
//! different directories proceed in parallel.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// In-process lock table keyed by normalised directory path.
#[derive(Debug, Clone, Default)]
pub struct DirLocks {
    table: Arc<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>>,
}

impl DirLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `dir`.
    pub async fn acquire(&self, dir: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(table.entry(normalize_path(dir)).or_default())
        };
        lock.lock_owned().await
    }
}

/// Lexically normalises `path`: drops `.` components and resolves `..`.
///
/// The filesystem is not consulted, so the key is the same before and after
/// the directory is created.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
