// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Immutable pipeline definitions
//!
//! A [`PipelineDef`] is produced by the manifest loader at load time and is
//! read-only during execution. The engine never mutates definitions; all
//! runtime state lives in [`crate::run::PipelineExecution`].
//!
//! The step graph is stored as IDs plus adjacency lists: dependencies point at
//! step IDs, never at step references, so the object graph is acyclic even
//! when the declared DAG is not (cycles are detected by the scheduler).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

crate::define_id! {
    /// Identifier of a step within a pipeline.
    ///
    /// Unique within its pipeline. Matrix fan-out appends a `[worker-k]`
    /// suffix to the declared ID for each runtime clone.
    pub struct StepId;
}

impl StepId {
    /// ID of the k-th matrix clone of this step.
    pub fn matrix_clone(&self, worker: u32) -> StepId {
        StepId::new(format!("{}[worker-{}]", self.0, worker))
    }

    /// The declared step ID with any `[worker-k]` suffix stripped.
    pub fn base(&self) -> &str {
        match self.0.find("[worker-") {
            Some(idx) => &self.0[..idx],
            None => &self.0,
        }
    }

    /// True if this ID names a matrix clone rather than a declared step.
    pub fn is_matrix_clone(&self) -> bool {
        self.0.contains("[worker-") && self.0.ends_with(']')
    }
}

/// Memory strategy for a step. Every step currently starts from a fresh
/// context; carry-over strategies are deliberately not supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStrategy {
    #[default]
    Fresh,
}

/// A declared artifact hand-over: copy `artifact` produced by `step` into the
/// consuming step's input directory under the name `as`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInjection {
    pub step: StepId,
    pub artifact: String,
    #[serde(rename = "as")]
    pub target: String,
}

/// Memory configuration: strategy plus declared input artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub strategy: MemoryStrategy,
    #[serde(default)]
    pub inject_artifacts: Vec<ArtifactInjection>,
}

/// Workspace kind for a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkspaceConfig {
    /// Plain per-step directory under the run's workspace root.
    #[default]
    EphemeralDir,
    /// Git worktree of a shared repository, pinned to a step branch.
    Worktree { repo_root: PathBuf },
}

impl WorkspaceConfig {
    pub fn is_worktree(&self) -> bool {
        matches!(self, WorkspaceConfig::Worktree { .. })
    }
}

fn default_timeout_ms() -> u64 {
    300_000
}

fn default_retry_window_ms() -> u64 {
    30_000
}

fn default_repo_lock_timeout_ms() -> u64 {
    30_000
}

/// Adapter invocation settings for a step.
///
/// All knobs the engine understands are explicit fields; there is no dynamic
/// option dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Adapter name override. Defaults to the persona's adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    /// Wall-clock budget for a single adapter invocation.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Additional attempts after the first failed one.
    #[serde(default)]
    pub max_retries: u32,
    /// Cap on the exponential retry backoff.
    #[serde(default = "default_retry_window_ms")]
    pub retry_window_ms: u64,
    /// Budget for acquiring the repository lock (worktree steps).
    #[serde(default = "default_repo_lock_timeout_ms")]
    pub repo_lock_timeout_ms: u64,
    /// Environment variables forwarded into the adapter subprocess on top of
    /// the curated base set.
    #[serde(default)]
    pub env_passthrough: Vec<String>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            timeout_ms: default_timeout_ms(),
            max_retries: 0,
            retry_window_ms: default_retry_window_ms(),
            repo_lock_timeout_ms: default_repo_lock_timeout_ms(),
            env_passthrough: Vec::new(),
        }
    }
}

impl ExecConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_window(&self) -> Duration {
        Duration::from_millis(self.retry_window_ms)
    }

    pub fn repo_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.repo_lock_timeout_ms)
    }
}

fn default_required() -> bool {
    true
}

/// A declared output artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDecl {
    pub name: String,
    /// Glob matched against the step's workspace after a successful run.
    pub path_pattern: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

/// Matrix fan-out: the step is cloned into `workers` runtime copies with
/// distinct IDs (`id[worker-k]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixStrategy {
    pub workers: u32,
}

/// A step definition within a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDef {
    pub id: StepId,
    /// Persona executing this step (resolved against the manifest).
    pub persona: String,
    /// Ordering edges. These gate scheduling but do not copy artifacts.
    #[serde(default)]
    pub dependencies: Vec<StepId>,
    /// Optional steps fail without halting the pipeline.
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub output_artifacts: Vec<ArtifactDecl>,
    /// JSON Schema the step's output must satisfy before hand-over.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<MatrixStrategy>,
}

impl StepDef {
    /// Steps whose artifacts this step consumes.
    pub fn injection_sources(&self) -> impl Iterator<Item = &StepId> {
        self.memory.inject_artifacts.iter().map(|i| &i.step)
    }

    /// All upstream edges: ordering dependencies plus injection sources,
    /// deduplicated.
    pub fn upstream(&self) -> BTreeSet<&StepId> {
        self.dependencies
            .iter()
            .chain(self.injection_sources())
            .collect()
    }
}

/// Top-level requirements validated by preflight before any step runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requires {
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

/// An immutable pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub requires: Requires,
    pub steps: Vec<StepDef>,
}

impl PipelineDef {
    /// Get a step by ID.
    pub fn get_step(&self, id: &StepId) -> Option<&StepDef> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// Declared step IDs in declaration order.
    pub fn step_ids(&self) -> impl Iterator<Item = &StepId> {
        self.steps.iter().map(|s| &s.id)
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
