// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime state of a single pipeline run.

use crate::pipeline::StepId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

crate::define_id! {
    /// Unique identifier for a pipeline run.
    ///
    /// Generated when `execute` is called and stable across resume.
    pub struct RunId;
}

/// State of a single step within a run.
///
/// `failed_optional` is a distinct persisted string so consumers filtering on
/// `failed` never misclassify optional failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Retrying,
    Completed,
    Failed,
    FailedOptional,
    Skipped,
    Cancelled,
}

impl StepState {
    /// Terminal states are never left within a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed
                | StepState::Failed
                | StepState::FailedOptional
                | StepState::Skipped
                | StepState::Cancelled
        )
    }

    /// Legal transition edges.
    pub fn can_transition_to(&self, next: StepState) -> bool {
        use StepState::*;
        match self {
            Pending => matches!(next, Running | Skipped | Cancelled),
            Running => matches!(
                next,
                Completed | Failed | FailedOptional | Retrying | Cancelled
            ),
            Retrying => matches!(next, Running | Cancelled),
            // Terminal states admit no further transitions.
            Completed | Failed | FailedOptional | Skipped | Cancelled => false,
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepState::Pending => "pending",
            StepState::Running => "running",
            StepState::Retrying => "retrying",
            StepState::Completed => "completed",
            StepState::Failed => "failed",
            StepState::FailedOptional => "failed_optional",
            StepState::Skipped => "skipped",
            StepState::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for StepState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepState::Pending),
            "running" => Ok(StepState::Running),
            "retrying" => Ok(StepState::Retrying),
            "completed" => Ok(StepState::Completed),
            "failed" => Ok(StepState::Failed),
            "failed_optional" => Ok(StepState::FailedOptional),
            "skipped" => Ok(StepState::Skipped),
            "cancelled" => Ok(StepState::Cancelled),
            other => Err(format!("unknown step state: {other}")),
        }
    }
}

/// Overall state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for RunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunState::Running),
            "completed" => Ok(RunState::Completed),
            "failed" => Ok(RunState::Failed),
            "cancelled" => Ok(RunState::Cancelled),
            other => Err(format!("unknown run state: {other}")),
        }
    }
}

/// Illegal step-state transition.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal transition for step {step}: {from} -> {to}")]
pub struct TransitionError {
    pub step: StepId,
    pub from: StepState,
    pub to: StepState,
}

/// A worktree registered for cleanup.
///
/// Entries are appended before the adapter runs; run cleanup visits every
/// entry exactly once, in LIFO order, regardless of outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeEntry {
    pub step_id: StepId,
    pub path: PathBuf,
    pub repo_root: PathBuf,
}

/// Runtime state of one pipeline run.
///
/// Exclusively owned by the executing scheduler task; state-store writes
/// originate only from that owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineExecution {
    pub run_id: RunId,
    pub pipeline_name: String,
    /// Opaque user input passed to the first adapter.
    pub input: String,
    /// Step states in schedule order.
    pub states: IndexMap<StepId, StepState>,
    pub workspace_paths: HashMap<StepId, PathBuf>,
    /// step -> artifact name -> absolute path.
    pub artifact_paths: HashMap<StepId, HashMap<String, PathBuf>>,
    pub worktrees: Vec<WorktreeEntry>,
    pub started_at_ms: u64,
    pub completed_at_ms: Option<u64>,
    pub overall: RunState,
    pub total_tokens: u64,
}

impl PipelineExecution {
    pub fn new(
        run_id: RunId,
        pipeline_name: impl Into<String>,
        input: impl Into<String>,
        started_at_ms: u64,
    ) -> Self {
        Self {
            run_id,
            pipeline_name: pipeline_name.into(),
            input: input.into(),
            states: IndexMap::new(),
            workspace_paths: HashMap::new(),
            artifact_paths: HashMap::new(),
            worktrees: Vec::new(),
            started_at_ms,
            completed_at_ms: None,
            overall: RunState::Running,
            total_tokens: 0,
        }
    }

    /// Current state of a step. Steps not yet touched are `pending`.
    pub fn state(&self, step: &StepId) -> StepState {
        self.states.get(step).copied().unwrap_or(StepState::Pending)
    }

    /// Apply a step-state transition, enforcing the legal edges.
    ///
    /// Re-applying the current state is a no-op (terminal writes are
    /// idempotent at the store layer, and resume replays them here).
    pub fn apply(&mut self, step: &StepId, next: StepState) -> Result<(), TransitionError> {
        let current = self.state(step);
        if current == next {
            return Ok(());
        }
        if !current.can_transition_to(next) {
            return Err(TransitionError {
                step: step.clone(),
                from: current,
                to: next,
            });
        }
        self.states.insert(step.clone(), next);
        Ok(())
    }

    /// Seed a step state without transition checking (resume reconstruction).
    pub fn restore(&mut self, step: StepId, state: StepState) {
        self.states.insert(step, state);
    }

    pub fn completed_steps(&self) -> Vec<&StepId> {
        self.steps_in(StepState::Completed)
    }

    pub fn failed_steps(&self) -> Vec<&StepId> {
        self.steps_in(StepState::Failed)
    }

    pub fn failed_optional_steps(&self) -> Vec<&StepId> {
        self.steps_in(StepState::FailedOptional)
    }

    pub fn skipped_steps(&self) -> Vec<&StepId> {
        self.steps_in(StepState::Skipped)
    }

    fn steps_in(&self, state: StepState) -> Vec<&StepId> {
        self.states
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn record_workspace(&mut self, step: &StepId, path: PathBuf) {
        self.workspace_paths.insert(step.clone(), path);
    }

    pub fn record_artifact(&mut self, step: &StepId, name: impl Into<String>, path: PathBuf) {
        self.artifact_paths
            .entry(step.clone())
            .or_default()
            .insert(name.into(), path);
    }

    pub fn artifact_path(&self, step: &StepId, name: &str) -> Option<&PathBuf> {
        self.artifact_paths.get(step).and_then(|m| m.get(name))
    }

    pub fn register_worktree(&mut self, entry: WorktreeEntry) {
        self.worktrees.push(entry);
    }

    /// Drain registered worktrees in LIFO order for cleanup.
    pub fn drain_worktrees(&mut self) -> Vec<WorktreeEntry> {
        let mut entries = std::mem::take(&mut self.worktrees);
        entries.reverse();
        entries
    }

    pub fn add_tokens(&mut self, delta: u64) {
        self.total_tokens += delta;
    }

    /// Mark the run terminal.
    pub fn finish(&mut self, overall: RunState, completed_at_ms: u64) {
        self.overall = overall;
        self.completed_at_ms = Some(completed_at_ms);
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
