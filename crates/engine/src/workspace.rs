// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-step workspace lifecycle.
//!
//! Ephemeral workspaces are plain directories under the run's workspace
//! root. Worktree workspaces are git worktrees of a shared repository; their
//! create and remove operations run under the repository lock and every
//! created worktree is registered on the run for cleanup. Cleanup visits the
//! registry in LIFO order and never propagates errors.

use crate::repo_lock::lock_repo;
use crate::subprocess::{run_with_timeout, GIT_WORKTREE_TIMEOUT};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use wave_core::{PipelineExecution, RunId, StepId, WorktreeEntry};

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspace path for a step, whether or not it exists yet.
    pub fn step_path(&self, run_id: &RunId, step_id: &StepId) -> PathBuf {
        self.root.join(run_id.as_str()).join(step_id.as_str())
    }

    /// Create an ephemeral workspace: `<root>/<run>/<step>/{artifacts,output,.claude}`.
    pub fn create_ephemeral(&self, run_id: &RunId, step_id: &StepId) -> std::io::Result<PathBuf> {
        let path = self.step_path(run_id, step_id);
        std::fs::create_dir_all(path.join("artifacts"))?;
        std::fs::create_dir_all(path.join("output"))?;
        std::fs::create_dir_all(path.join(".claude"))?;
        Ok(path)
    }

    /// Create a git worktree for a step, pinned to a step branch.
    ///
    /// Holds the repository lock for the entire mutation. The returned entry
    /// must be registered on the run for cleanup.
    pub async fn create_worktree(
        &self,
        run_id: &RunId,
        step_id: &StepId,
        repo_root: &Path,
        lock_timeout: Duration,
    ) -> Result<WorktreeEntry, String> {
        let path = self.step_path(run_id, step_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let branch = branch_name(run_id, step_id);

        let _lock = lock_repo(repo_root, lock_timeout)
            .await
            .ok_or_else(|| format!("repo lock timed out for {}", repo_root.display()))?;

        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(repo_root)
            .arg("worktree")
            .arg("add")
            .arg("-B")
            .arg(&branch)
            .arg(&path);
        let output = run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git worktree add").await?;
        if !output.status.success() {
            return Err(format!(
                "git worktree add failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        tracing::info!(
            run_id = %run_id,
            step_id = %step_id,
            path = %path.display(),
            branch,
            "worktree created"
        );

        Ok(WorktreeEntry {
            step_id: step_id.clone(),
            path,
            repo_root: repo_root.to_owned(),
        })
    }

    /// Remove a worktree and prune stale metadata, under the repo lock.
    pub async fn remove_worktree(
        &self,
        entry: &WorktreeEntry,
        lock_timeout: Duration,
    ) -> Result<(), String> {
        let _lock = lock_repo(&entry.repo_root, lock_timeout)
            .await
            .ok_or_else(|| format!("repo lock timed out for {}", entry.repo_root.display()))?;

        let mut remove = Command::new("git");
        remove
            .arg("-C")
            .arg(&entry.repo_root)
            .arg("worktree")
            .arg("remove")
            .arg("--force")
            .arg(&entry.path);
        let output = run_with_timeout(remove, GIT_WORKTREE_TIMEOUT, "git worktree remove").await?;
        if !output.status.success() {
            // Leftover directories still need to go.
            let _ = std::fs::remove_dir_all(&entry.path);
        }

        let mut prune = Command::new("git");
        prune
            .arg("-C")
            .arg(&entry.repo_root)
            .arg("worktree")
            .arg("prune");
        let _ = run_with_timeout(prune, GIT_WORKTREE_TIMEOUT, "git worktree prune").await?;

        Ok(())
    }

    /// Remove every worktree registered on the run, newest first.
    ///
    /// Runs on every exit path. Errors are logged, never propagated.
    pub async fn cleanup_run(&self, exec: &mut PipelineExecution, lock_timeout: Duration) {
        for entry in exec.drain_worktrees() {
            if let Err(e) = self.remove_worktree(&entry, lock_timeout).await {
                tracing::warn!(
                    run_id = %exec.run_id,
                    step_id = %entry.step_id,
                    path = %entry.path.display(),
                    error = %e,
                    "worktree cleanup failed"
                );
            }
        }
    }

    /// Delete a run's entire workspace tree (explicit cleanup, not automatic).
    pub fn remove_run(&self, run_id: &RunId) -> std::io::Result<()> {
        let dir = self.root.join(run_id.as_str());
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Branch for a step worktree. Step IDs may contain characters git refuses
/// in refnames (matrix clones carry brackets), so everything outside
/// `[A-Za-z0-9._-]` collapses to a hyphen.
fn branch_name(run_id: &RunId, step_id: &StepId) -> String {
    let sanitized: String = step_id
        .as_str()
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '-',
        })
        .collect();
    format!("wave/{}/{}", run_id, sanitized.trim_matches('-'))
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
