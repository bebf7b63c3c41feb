// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resume reconstruction.
//!
//! Rebuilds a `PipelineExecution` from persisted records. Steps that ended
//! `completed`, `failed_optional`, or `skipped` keep their states and are
//! never re-executed; steps caught in `failed`, `running`, or `retrying` (the
//! latter two indicating a crash) reset to `pending` so the scheduler runs
//! them again. Resume is therefore at-least-once at the step boundary,
//! deduplicated by completion state.

use crate::error::RuntimeError;
use wave_core::{PipelineExecution, RunId, StepState};
use wave_storage::StateReader;

/// Load a run's persisted state into a fresh `PipelineExecution`.
pub fn reconstruct_execution(
    reader: &StateReader,
    run_id: &RunId,
) -> Result<PipelineExecution, RuntimeError> {
    let run = reader
        .get_run(run_id)?
        .ok_or_else(|| RuntimeError::RunNotFound(run_id.to_string()))?;

    let mut exec = PipelineExecution::new(
        run_id.clone(),
        run.pipeline,
        run.input,
        run.started_at_ms,
    );
    exec.total_tokens = run.total_tokens;
    exec.overall = run.state;

    for record in reader.get_step_states(run_id)? {
        exec.restore(record.step_id, record.state);
    }
    for artifact in reader.get_artifacts(run_id)? {
        exec.record_artifact(&artifact.step_id, artifact.name, artifact.path);
    }

    Ok(exec)
}

/// Reset re-executable states to `pending` ahead of a resumed walk.
pub(crate) fn reset_for_resume(exec: &mut PipelineExecution) {
    let reexecute: Vec<_> = exec
        .states
        .iter()
        .filter(|(_, state)| {
            matches!(
                state,
                StepState::Failed | StepState::Running | StepState::Retrying | StepState::Cancelled
            )
        })
        .map(|(id, _)| id.clone())
        .collect();

    for id in reexecute {
        exec.restore(id, StepState::Pending);
    }
}

#[cfg(test)]
#[path = "resume_tests.rs"]
mod tests;
