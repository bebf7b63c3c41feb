// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-step execution.
//!
//! Runs one step end-to-end: workspace acquisition (worktree under the repo
//! lock), artifact injection, the adapter retry loop, contract validation,
//! output artifact collection, and terminal-state bookkeeping. Optional-step
//! failure is a control-flow outcome, not an error: the step lands in
//! `failed_optional` and the scheduler keeps going.

use crate::contract::{validate_contract, ContractError, ValidationFailure};
use crate::error::{RuntimeError, StepError};
use crate::inject::inject_artifacts;
use crate::runner::EngineCtx;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wave_adapters::stream::StreamEvent;
use wave_adapters::{Adapter, AdapterOutput, RunConfig};
use wave_core::{
    Clock, ContractIssue, Event, PipelineExecution, StepDef, StepState, WorkspaceConfig,
};
use wave_storage::{StateStore, StoreError};

/// Base delay of the exponential retry backoff.
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Execute one step.
///
/// Returns `Ok(())` on completion and on optional-step failure; returns a
/// [`StepError`] only when a required step fails (halting the pipeline).
pub(crate) async fn execute_step<A: Adapter, C: Clock>(
    ctx: &EngineCtx<A, C>,
    step: &StepDef,
    exec: &mut PipelineExecution,
    skip_validation: bool,
) -> Result<(), StepError> {
    let step_id = step.id.clone();

    let body = run_step_body(ctx, step, exec, skip_validation).await;

    match body {
        Ok(done) => {
            if let Err(e) = finish_success(ctx, step, exec, done) {
                return fail_step(ctx, step, exec, e);
            }
            Ok(())
        }
        Err(RuntimeError::Cancelled) => {
            let _ = persist(ctx, exec, step, StepState::Cancelled, Some("cancelled"));
            Err(StepError::new(step_id, RuntimeError::Cancelled))
        }
        Err(e) => fail_step(ctx, step, exec, e),
    }
}

/// Everything that can fail mid-step, separated from terminal bookkeeping.
async fn run_step_body<A: Adapter, C: Clock>(
    ctx: &EngineCtx<A, C>,
    step: &StepDef,
    exec: &mut PipelineExecution,
    skip_validation: bool,
) -> Result<StepDone, RuntimeError> {
    let run_id = exec.run_id.clone();

    persist(ctx, exec, step, StepState::Running, None)?;
    ctx.emitter.emit(
        Event::StepStart {
            run_id: run_id.clone(),
            step_id: step.id.clone(),
            persona: step.persona.clone(),
            optional: step.optional,
        },
        ctx.clock.epoch_ms(),
    );

    // Workspace, registered for cleanup before the adapter ever runs.
    let workspace = match &step.workspace {
        WorkspaceConfig::EphemeralDir => ctx
            .workspaces
            .create_ephemeral(&run_id, &step.id)
            .map_err(|e| RuntimeError::Workspace(e.to_string()))?,
        WorkspaceConfig::Worktree { repo_root } => {
            let entry = ctx
                .workspaces
                .create_worktree(&run_id, &step.id, repo_root, step.exec.repo_lock_timeout())
                .await
                .map_err(RuntimeError::Workspace)?;
            let path = entry.path.clone();
            exec.register_worktree(entry);
            path
        }
    };
    exec.record_workspace(&step.id, workspace.clone());

    let persona = ctx
        .personas
        .get(&step.persona)
        .ok_or_else(|| RuntimeError::UnknownPersona(step.persona.clone()))?;
    let step_skills: Vec<_> = ctx.skills.values().cloned().collect();
    ctx.adapter
        .prepare(&workspace, persona, &step_skills)
        .await
        .map_err(RuntimeError::Adapter)?;

    inject_artifacts(step, exec, &workspace)?;

    let mut tokens_total = 0u64;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        let (tx, rx) = mpsc::channel::<StreamEvent>(256);
        let forward = tokio::spawn(forward_stream(
            ctx.store.clone(),
            Arc::clone(&ctx.emitter),
            ctx.clock.clone(),
            exec.run_id.clone(),
            step.id.clone(),
            rx,
        ));

        let config = RunConfig {
            run_id: run_id.clone(),
            step_id: step.id.clone(),
            persona: step.persona.clone(),
            workspace: workspace.clone(),
            prompt: build_prompt(exec, step),
            timeout: step.exec.timeout(),
            env_passthrough: step.exec.env_passthrough.clone(),
            binary: ctx.adapter_binary.clone(),
            cancel: ctx.cancel.clone(),
        };

        let result = ctx.adapter.run(config, tx).await;

        let (streamed, store_failure) = forward.await.unwrap_or((0, None));
        if let Some(e) = store_failure {
            return Err(RuntimeError::Store(e));
        }

        match result {
            Ok(output) => {
                // Stream deltas are already persisted; top up with whatever
                // the terminal result reported beyond them.
                let reported = output.tokens_used.max(streamed);
                let shortfall = reported.saturating_sub(streamed);
                if shortfall > 0 {
                    ctx.store
                        .append_step_progress(&run_id, &step.id, shortfall)?;
                }
                tokens_total += reported;

                if skip_validation {
                    break;
                }
                let Some(schema) = &step.contract else {
                    break;
                };

                let document = load_output_document(&workspace, &output);
                match check_contract(ctx, exec, step, schema, document.as_ref(), attempt) {
                    Ok(()) => break,
                    Err(RuntimeError::Validation(failure))
                        if failure.retryable && attempt <= step.exec.max_retries =>
                    {
                        retry_pause(ctx, exec, step, attempt, "contract validation failed")
                            .await?;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(e) => {
                tokens_total += streamed.max(e.tokens_used());
                if ctx.cancel.is_cancelled() {
                    return Err(RuntimeError::Cancelled);
                }
                if e.is_retryable() && attempt <= step.exec.max_retries {
                    retry_pause(ctx, exec, step, attempt, &e.to_string()).await?;
                    continue;
                }
                return Err(RuntimeError::Adapter(e));
            }
        }
    }

    Ok(StepDone {
        workspace,
        tokens: tokens_total,
    })
}

struct StepDone {
    workspace: PathBuf,
    tokens: u64,
}

/// Record outputs and mark the step completed.
fn finish_success<A: Adapter, C: Clock>(
    ctx: &EngineCtx<A, C>,
    step: &StepDef,
    exec: &mut PipelineExecution,
    done: StepDone,
) -> Result<(), RuntimeError> {
    let now = ctx.clock.epoch_ms();

    for decl in &step.output_artifacts {
        let found = find_artifact(&done.workspace, &decl.path_pattern)?;
        match found {
            Some(path) => {
                let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                ctx.store
                    .record_artifact(&exec.run_id, &step.id, &decl.name, &path, size, now)?;
                exec.record_artifact(&step.id, decl.name.clone(), path);
            }
            None if decl.required => {
                return Err(RuntimeError::OutputMissing(decl.name.clone()));
            }
            None => {
                tracing::debug!(step_id = %step.id, artifact = %decl.name, "optional artifact absent");
            }
        }
    }

    persist(ctx, exec, step, StepState::Completed, None)?;
    exec.add_tokens(done.tokens);
    ctx.emitter.emit(
        Event::StepComplete {
            run_id: exec.run_id.clone(),
            step_id: step.id.clone(),
            tokens_used: done.tokens,
            optional: step.optional,
        },
        ctx.clock.epoch_ms(),
    );
    Ok(())
}

/// Terminal failure bookkeeping: `failed_optional` keeps the pipeline going,
/// `failed` halts it.
fn fail_step<A: Adapter, C: Clock>(
    ctx: &EngineCtx<A, C>,
    step: &StepDef,
    exec: &mut PipelineExecution,
    error: RuntimeError,
) -> Result<(), StepError> {
    let failure_reason = match &error {
        RuntimeError::Adapter(e) => Some(e.reason()),
        _ => None,
    };
    let remediation = match &error {
        RuntimeError::Adapter(e) => e.remediation(),
        _ => None,
    };
    let message = error.to_string();
    let now = ctx.clock.epoch_ms();

    if step.optional {
        if let Err(e) = persist(ctx, exec, step, StepState::FailedOptional, Some(&message)) {
            return Err(StepError::new(step.id.clone(), e));
        }
        ctx.emitter.emit(
            Event::StepFailedOptional {
                run_id: exec.run_id.clone(),
                step_id: step.id.clone(),
                message,
                failure_reason,
            },
            now,
        );
        return Ok(());
    }

    if let Err(e) = persist(ctx, exec, step, StepState::Failed, Some(&message)) {
        return Err(StepError::new(step.id.clone(), e));
    }
    ctx.emitter.emit(
        Event::StepFailed {
            run_id: exec.run_id.clone(),
            step_id: step.id.clone(),
            message,
            failure_reason,
            remediation,
        },
        now,
    );
    Err(StepError::new(step.id.clone(), error))
}

/// Apply a transition in memory and persist it, as one operation.
fn persist<A: Adapter, C: Clock>(
    ctx: &EngineCtx<A, C>,
    exec: &mut PipelineExecution,
    step: &StepDef,
    state: StepState,
    error: Option<&str>,
) -> Result<(), RuntimeError> {
    exec.apply(&step.id, state)?;
    ctx.store
        .save_step_state(&exec.run_id, &step.id, state, error, ctx.clock.epoch_ms())?;
    Ok(())
}

/// Between attempts: mark retrying, emit the retry event, back off, re-enter
/// running.
async fn retry_pause<A: Adapter, C: Clock>(
    ctx: &EngineCtx<A, C>,
    exec: &mut PipelineExecution,
    step: &StepDef,
    attempt: u32,
    cause: &str,
) -> Result<(), RuntimeError> {
    let delay = retry_delay(attempt, step.exec.retry_window());
    persist(ctx, exec, step, StepState::Retrying, Some(cause))?;
    ctx.emitter.emit(
        Event::Retry {
            run_id: exec.run_id.clone(),
            step_id: step.id.clone(),
            attempt,
            delay_ms: delay.as_millis() as u64,
            message: cause.to_string(),
        },
        ctx.clock.epoch_ms(),
    );
    tokio::time::sleep(delay).await;
    persist(ctx, exec, step, StepState::Running, None)?;
    Ok(())
}

/// Exponential backoff from 1 s, capped by the step's retry window.
fn retry_delay(attempt: u32, retry_window: Duration) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let delay = RETRY_BASE_DELAY.saturating_mul(1u32 << exp);
    delay.min(retry_window)
}

/// Validate the output document, emitting a `contract_validation` event
/// either way.
fn check_contract<A: Adapter, C: Clock>(
    ctx: &EngineCtx<A, C>,
    exec: &PipelineExecution,
    step: &StepDef,
    schema: &serde_json::Value,
    document: Option<&serde_json::Value>,
    attempt: u32,
) -> Result<(), RuntimeError> {
    let now = ctx.clock.epoch_ms();

    let result = match document {
        Some(document) => validate_contract(schema, document, attempt),
        // No document at all: retryable, the adapter may produce one.
        None => Err(ContractError::Failed(ValidationFailure {
            errors: vec![ContractIssue {
                path: String::new(),
                message: "no output document produced".to_string(),
            }],
            retryable: true,
            attempt,
        })),
    };

    match result {
        Ok(()) => {
            ctx.emitter.emit(
                Event::ContractValidation {
                    run_id: exec.run_id.clone(),
                    step_id: step.id.clone(),
                    ok: true,
                    attempt,
                    errors: Vec::new(),
                },
                now,
            );
            Ok(())
        }
        Err(ContractError::Failed(failure)) => {
            ctx.emitter.emit(
                Event::ContractValidation {
                    run_id: exec.run_id.clone(),
                    step_id: step.id.clone(),
                    ok: false,
                    attempt,
                    errors: failure.errors.clone(),
                },
                now,
            );
            Err(RuntimeError::Validation(failure))
        }
        Err(ContractError::Fatal(message)) => {
            let failure = ValidationFailure {
                errors: vec![ContractIssue {
                    path: String::new(),
                    message,
                }],
                retryable: false,
                attempt,
            };
            ctx.emitter.emit(
                Event::ContractValidation {
                    run_id: exec.run_id.clone(),
                    step_id: step.id.clone(),
                    ok: false,
                    attempt,
                    errors: failure.errors.clone(),
                },
                now,
            );
            Err(RuntimeError::Validation(failure))
        }
    }
}

/// The adapter's final output: the well-known file wins over the inline
/// result.
fn load_output_document(workspace: &Path, output: &AdapterOutput) -> Option<serde_json::Value> {
    let path = workspace.join("output/result.json");
    if let Ok(content) = std::fs::read_to_string(&path) {
        if let Ok(value) = serde_json::from_str(&content) {
            return Some(value);
        }
    }
    output.output.clone()
}

/// First filesystem match for an output artifact pattern.
fn find_artifact(workspace: &Path, pattern: &str) -> Result<Option<PathBuf>, RuntimeError> {
    let full = workspace.join(pattern);
    let matches = glob::glob(&full.to_string_lossy())
        .map_err(|e| RuntimeError::Workspace(format!("bad artifact pattern {pattern}: {e}")))?;
    Ok(matches.flatten().find(|p| p.is_file()))
}

/// Prompt handed to the adapter: the pipeline input plus staged artifact
/// names. The detailed protocol lives in the workspace system prompt.
fn build_prompt(exec: &PipelineExecution, step: &StepDef) -> String {
    let mut prompt = exec.input.clone();
    if !step.memory.inject_artifacts.is_empty() {
        prompt.push_str("\n\nInput artifacts staged in artifacts/: ");
        let names: Vec<&str> = step
            .memory
            .inject_artifacts
            .iter()
            .map(|i| i.target.as_str())
            .collect();
        prompt.push_str(&names.join(", "));
    }
    prompt
}

/// Forward adapter stream events into progress events and persisted token
/// deltas. Returns the accumulated token count and the first store failure.
async fn forward_stream<C: Clock>(
    store: StateStore,
    emitter: Arc<crate::emitter::EventEmitter>,
    clock: C,
    run_id: wave_core::RunId,
    step_id: wave_core::StepId,
    mut rx: mpsc::Receiver<StreamEvent>,
) -> (u64, Option<StoreError>) {
    let mut total = 0u64;
    let mut store_failure = None;

    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::TokenUsage { delta } => {
                total += delta;
                if store_failure.is_none() {
                    if let Err(e) = store.append_step_progress(&run_id, &step_id, delta) {
                        store_failure = Some(e);
                    }
                }
                emitter.emit(
                    Event::StepProgress {
                        run_id: run_id.clone(),
                        step_id: step_id.clone(),
                        tokens_used: total,
                        message: None,
                    },
                    clock.epoch_ms(),
                );
            }
            StreamEvent::ToolUse { tool, detail } => {
                let message = if detail.is_empty() {
                    tool
                } else {
                    format!("{tool}: {detail}")
                };
                emitter.emit(
                    Event::ToolActivity {
                        run_id: run_id.clone(),
                        step_id: step_id.clone(),
                        message,
                    },
                    clock.epoch_ms(),
                );
            }
            StreamEvent::Delta { .. } | StreamEvent::Result { .. } => {}
        }
    }

    (total, store_failure)
}

#[cfg(test)]
#[path = "step_exec_tests.rs"]
mod tests;
