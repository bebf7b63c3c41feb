// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact injection.
//!
//! Materialises declared inputs in a step's `artifacts/` directory before the
//! adapter runs. Injection always copies bytes — never links — so a step can
//! never observe later mutations by other steps. Ordering-only dependencies
//! (listed in `dependencies` without a matching `inject_artifacts` entry)
//! copy nothing.

use crate::error::RuntimeError;
use std::path::PathBuf;
use wave_core::{PipelineExecution, StepDef};

/// Copy every declared input artifact into `workspace/artifacts/`.
///
/// Skip propagation has already been decided by the scheduler from source
/// states; by the time injection runs, every source is expected to be
/// `completed`. A missing artifact here is therefore fatal for the step.
///
/// Returns the staged `(target name, path)` pairs.
pub fn inject_artifacts(
    step: &StepDef,
    exec: &PipelineExecution,
    workspace: &std::path::Path,
) -> Result<Vec<(String, PathBuf)>, RuntimeError> {
    if step.memory.inject_artifacts.is_empty() {
        return Ok(Vec::new());
    }

    let input_dir = workspace.join("artifacts");
    std::fs::create_dir_all(&input_dir).map_err(|e| RuntimeError::Workspace(e.to_string()))?;

    let mut staged = Vec::new();
    for injection in &step.memory.inject_artifacts {
        let source_path = exec
            .artifact_path(&injection.step, &injection.artifact)
            .ok_or_else(|| RuntimeError::ArtifactMissing {
                step: injection.step.clone(),
                artifact: injection.artifact.clone(),
            })?;

        let target = input_dir.join(&injection.target);
        std::fs::copy(source_path, &target).map_err(|e| {
            RuntimeError::Workspace(format!(
                "copying {} -> {}: {}",
                source_path.display(),
                target.display(),
                e
            ))
        })?;

        tracing::debug!(
            step_id = %step.id,
            source = %injection.step,
            artifact = %injection.artifact,
            target = %target.display(),
            "artifact injected"
        );
        staged.push((injection.target.clone(), target));
    }

    Ok(staged)
}

#[cfg(test)]
#[path = "inject_tests.rs"]
mod tests;
