// ABOUTME: Per-path write locks backed by a sharded concurrent map
// ABOUTME: Entries are dropped once no writer holds or waits on them, so the table stays bounded

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<PathBuf, Arc<Mutex<()>>>;

/// Serializes writers to the same path; writers to different paths never contend.
#[derive(Debug, Clone, Default)]
pub struct LockTable {
    locks: Arc<LockMap>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `path`
    pub async fn lock(&self, path: &Path) -> PathLockGuard {
        // Clone the mutex out of the shard before awaiting so the shard lock
        // is not held across the wait.
        let mutex = self
            .locks
            .entry(path.to_path_buf())
            .or_default()
            .value()
            .clone();

        let guard = mutex.lock_owned().await;

        PathLockGuard {
            locks: Arc::clone(&self.locks),
            path: path.to_path_buf(),
            guard: Some(guard),
        }
    }

    /// Number of paths that currently have a holder or a waiter
    pub fn active_paths(&self) -> usize {
        self.locks.len()
    }
}

/// Exclusive hold on one path. Releasing the last reference removes the entry.
#[derive(Debug)]
pub struct PathLockGuard {
    locks: Arc<LockMap>,
    path: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl PathLockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathLockGuard {
    fn drop(&mut self) {
        // The owned guard keeps a strong reference to the mutex; release it
        // first so a count of one means only the table refers to it.
        drop(self.guard.take());
        self.locks
            .remove_if(&self.path, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
