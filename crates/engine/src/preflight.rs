// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Preflight checks.
//!
//! Runs once per `execute`, before the first step leaves `pending`: every
//! required tool must resolve on PATH, and every required skill must pass its
//! `check` command (installing and initialising it first when configured).
//! Any unsatisfied requirement aborts the pipeline.

use crate::emitter::EventEmitter;
use crate::error::RuntimeError;
use crate::subprocess::{run_with_timeout, shell, PREFLIGHT_TIMEOUT};
use serde_json::json;
use std::collections::HashMap;
use wave_core::{Clock, Event, Requires, RunId, SkillDef};

pub async fn run_preflight<C: Clock>(
    requires: &Requires,
    skills: &HashMap<String, SkillDef>,
    emitter: &EventEmitter,
    run_id: &RunId,
    clock: &C,
) -> Result<(), RuntimeError> {
    let mut missing = Vec::new();

    for tool in &requires.tools {
        let found = which::which(tool).is_ok();
        emitter.emit(
            Event::Preflight {
                run_id: run_id.clone(),
                message: if found {
                    format!("tool {tool} found")
                } else {
                    format!("tool {tool} not found on PATH")
                },
                data: json!({"tool": tool, "found": found}),
            },
            clock.epoch_ms(),
        );
        if !found {
            missing.push(format!("tool {tool}"));
        }
    }

    for name in &requires.skills {
        let Some(skill) = skills.get(name) else {
            return Err(RuntimeError::Preflight(format!(
                "skill {name} is required but not defined in the manifest"
            )));
        };
        if let Err(detail) = ensure_skill(skill, emitter, run_id, clock).await {
            missing.push(format!("skill {name} ({detail})"));
        }
    }

    if !missing.is_empty() {
        return Err(RuntimeError::Preflight(missing.join("; ")));
    }
    Ok(())
}

/// Check a skill, auto-installing on first failure when configured.
async fn ensure_skill<C: Clock>(
    skill: &SkillDef,
    emitter: &EventEmitter,
    run_id: &RunId,
    clock: &C,
) -> Result<(), String> {
    if check_skill(skill).await.is_ok() {
        emit_skill(emitter, run_id, clock, &skill.name, "available");
        return Ok(());
    }

    let Some(install) = &skill.install else {
        emit_skill(emitter, run_id, clock, &skill.name, "missing");
        return Err("check failed and no install command configured".to_string());
    };

    emit_skill(emitter, run_id, clock, &skill.name, "installing");
    let output = run_with_timeout(shell(install), PREFLIGHT_TIMEOUT, "skill install").await?;
    if !output.status.success() {
        emit_skill(emitter, run_id, clock, &skill.name, "install_failed");
        return Err(format!(
            "install failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    if let Some(init) = &skill.init {
        let output = run_with_timeout(shell(init), PREFLIGHT_TIMEOUT, "skill init").await?;
        if !output.status.success() {
            emit_skill(emitter, run_id, clock, &skill.name, "init_failed");
            return Err(format!(
                "init failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
    }

    check_skill(skill)
        .await
        .map_err(|e| format!("check still failing after install: {e}"))?;
    emit_skill(emitter, run_id, clock, &skill.name, "installed");
    Ok(())
}

async fn check_skill(skill: &SkillDef) -> Result<(), String> {
    let output = run_with_timeout(shell(&skill.check), PREFLIGHT_TIMEOUT, "skill check").await?;
    if output.status.success() {
        Ok(())
    } else {
        Err(format!("exit {}", output.status.code().unwrap_or(-1)))
    }
}

fn emit_skill<C: Clock>(
    emitter: &EventEmitter,
    run_id: &RunId,
    clock: &C,
    name: &str,
    status: &str,
) {
    emitter.emit(
        Event::Preflight {
            run_id: run_id.clone(),
            message: format!("skill {name}: {status}"),
            data: json!({"skill": name, "status": status}),
        },
        clock.epoch_ms(),
    );
}

#[cfg(test)]
#[path = "preflight_tests.rs"]
mod tests;
