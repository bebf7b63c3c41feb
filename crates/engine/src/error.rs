// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine runtime

use crate::contract::ValidationFailure;
use thiserror::Error;
use wave_adapters::AdapterError;
use wave_core::StepId;
use wave_storage::StoreError;

/// Errors that can occur in the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("dependency cycle among steps: {0}")]
    CyclicDependency(String),
    #[error("unknown step referenced: {0}")]
    UnknownStep(String),
    #[error("unknown persona: {0}")]
    UnknownPersona(String),
    #[error("preflight failed: {0}")]
    Preflight(String),
    #[error("workspace error: {0}")]
    Workspace(String),
    #[error("repo lock timed out for {0}")]
    RepoLockTimeout(String),
    #[error("artifact {artifact} missing from step {step}")]
    ArtifactMissing { step: StepId, artifact: String },
    #[error("required output artifact {0} not produced")]
    OutputMissing(String),
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),
    #[error("contract validation failed: {0}")]
    Validation(ValidationFailure),
    #[error("permission violation: {0}")]
    SecurityViolation(String),
    #[error("state store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transition(#[from] wave_core::TransitionError),
    #[error("run not found: {0}")]
    RunNotFound(String),
    #[error("run cancelled")]
    Cancelled,
    #[error("step {0} failed")]
    Step(StepError),
}

/// A required step's failure, wrapped so the scheduler can identify the step
/// programmatically.
#[derive(Debug, Error)]
#[error("step {step_id} failed: {source}")]
pub struct StepError {
    pub step_id: StepId,
    pub source: Box<RuntimeError>,
}

impl StepError {
    pub fn new(step_id: StepId, source: RuntimeError) -> Self {
        Self {
            step_id,
            source: Box::new(source),
        }
    }
}
