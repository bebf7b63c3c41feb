// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline walk.
//!
//! Sequential dispatch over the runtime step list (already in topological
//! order). Skip propagation is decided here, at dispatch time, from the
//! already-persisted source states — a step whose injection source landed in
//! `failed_optional` or `skipped` is marked `skipped` without its executor
//! ever being invoked. A required step's failure halts the walk, leaving
//! later steps untouched in `pending`.

use crate::error::StepError;
use crate::runner::EngineCtx;
use crate::step_exec::execute_step;
use wave_adapters::Adapter;
use wave_core::{Clock, Event, PipelineExecution, StepDef, StepId, StepState};

/// Outcome of a full walk.
pub(crate) enum WalkOutcome {
    /// Every step is terminal-successful (`completed`, `failed_optional`,
    /// or `skipped`).
    Completed,
    /// Cancellation observed; remaining steps were not started.
    Cancelled,
    /// A required step failed; later steps remain `pending`.
    Failed(StepError),
}

pub(crate) async fn walk_pipeline<A: Adapter, C: Clock>(
    ctx: &EngineCtx<A, C>,
    steps: &[StepDef],
    exec: &mut PipelineExecution,
    skip_validation: bool,
) -> WalkOutcome {
    for step in steps {
        if ctx.cancel.is_cancelled() {
            return WalkOutcome::Cancelled;
        }

        // Resume: terminal steps from a prior run are never re-executed and
        // emit no new events.
        if exec.state(&step.id).is_terminal() {
            continue;
        }

        if let Some(source) = skip_source(step, exec) {
            let reason = format!(
                "upstream step {} is {}",
                source,
                exec.state(&source)
            );
            if exec.apply(&step.id, StepState::Skipped).is_ok() {
                if let Err(e) = ctx.store.save_step_state(
                    &exec.run_id,
                    &step.id,
                    StepState::Skipped,
                    Some(&reason),
                    ctx.clock.epoch_ms(),
                ) {
                    return WalkOutcome::Failed(StepError::new(step.id.clone(), e.into()));
                }
                ctx.emitter.emit(
                    Event::StepSkipped {
                        run_id: exec.run_id.clone(),
                        step_id: step.id.clone(),
                        message: reason,
                    },
                    ctx.clock.epoch_ms(),
                );
            }
            continue;
        }

        match execute_step(ctx, step, exec, skip_validation).await {
            Ok(()) => {}
            Err(e) if matches!(*e.source, crate::error::RuntimeError::Cancelled) => {
                return WalkOutcome::Cancelled;
            }
            Err(e) => return WalkOutcome::Failed(e),
        }
    }

    WalkOutcome::Completed
}

/// First injection source whose state propagates a skip. Ordering-only
/// dependencies never propagate.
fn skip_source(step: &StepDef, exec: &PipelineExecution) -> Option<StepId> {
    step.memory
        .inject_artifacts
        .iter()
        .map(|i| &i.step)
        .find(|source| {
            matches!(
                exec.state(source),
                StepState::FailedOptional | StepState::Skipped
            )
        })
        .cloned()
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
