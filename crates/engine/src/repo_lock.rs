// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-repository mutual exclusion.
//!
//! A process-wide registry maps canonical repository roots to locks so that
//! worktree create/remove never interleave on the same repository, across
//! every pipeline run in the process. The registry is populated lazily and
//! entries are never evicted; the number of distinct repositories a process
//! touches is small.
//!
//! The lock guards only the version-control mutation. Adapter execution runs
//! with the lock released. Waiters are not FIFO; worktree operations are
//! short enough that starvation is not a practical concern.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Default budget for acquiring a repo lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>> = OnceLock::new();

/// Held for the duration of a repository mutation. Dropping releases.
pub struct RepoLockGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Resolve different path spellings of the same repository to one key.
fn canonical_root(repo_root: &Path) -> PathBuf {
    std::fs::canonicalize(repo_root).unwrap_or_else(|_| repo_root.to_owned())
}

fn lock_for(repo_root: &Path) -> Arc<AsyncMutex<()>> {
    let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = registry.lock();
    map.entry(canonical_root(repo_root))
        .or_insert_with(|| Arc::new(AsyncMutex::new(())))
        .clone()
}

/// Acquire the lock for a repository, waiting at most `timeout`.
pub async fn lock_repo(repo_root: &Path, timeout: Duration) -> Option<RepoLockGuard> {
    let lock = lock_for(repo_root);
    match tokio::time::timeout(timeout, lock.lock_owned()).await {
        Ok(guard) => Some(RepoLockGuard { _guard: guard }),
        Err(_) => None,
    }
}

#[cfg(test)]
#[path = "repo_lock_tests.rs"]
mod tests;
