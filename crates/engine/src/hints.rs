// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery hints.
//!
//! On terminal failure the engine classifies the error and builds an ordered
//! list of next-step commands: always a resume command and a workspace
//! pointer, plus a force variant for contract failures and a debug pointer
//! for runtime/unknown classes. Hints are structured data; the CLI renders
//! them, the JSON mode attaches them to the terminal failure event.

use crate::error::RuntimeError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use wave_core::{RunId, StepId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintKind {
    Resume,
    Force,
    Workspace,
    Debug,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryHint {
    pub label: String,
    pub command: String,
    pub kind: HintKind,
}

/// Failure classes that drive hint construction. Derived from the error
/// variant, never from message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    ContractValidation,
    SecurityViolation,
    Runtime,
    Unknown,
}

pub fn classify(error: &RuntimeError) -> ErrorClass {
    match error {
        RuntimeError::Validation(_) => ErrorClass::ContractValidation,
        RuntimeError::SecurityViolation(_) => ErrorClass::SecurityViolation,
        RuntimeError::Adapter(_)
        | RuntimeError::Workspace(_)
        | RuntimeError::RepoLockTimeout(_)
        | RuntimeError::ArtifactMissing { .. }
        | RuntimeError::OutputMissing(_)
        | RuntimeError::Store(_) => ErrorClass::Runtime,
        RuntimeError::Step(inner) => classify(&inner.source),
        _ => ErrorClass::Unknown,
    }
}

/// POSIX single-quote an argument (`it's` becomes `'it'\''s'`).
pub fn shell_quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');
    for c in s.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

pub fn build_hints(
    pipeline: &str,
    input: &str,
    run_id: &RunId,
    step_id: &StepId,
    class: ErrorClass,
    workspace: Option<&Path>,
) -> Vec<RecoveryHint> {
    let mut hints = Vec::new();

    let resume = format!(
        "wave run {} --input {} --resume {} --from-step {}",
        shell_quote(pipeline),
        shell_quote(input),
        shell_quote(run_id.as_str()),
        shell_quote(step_id.as_str()),
    );

    hints.push(RecoveryHint {
        label: format!("re-run the pipeline from step {step_id}"),
        command: resume.clone(),
        kind: HintKind::Resume,
    });

    if class == ErrorClass::ContractValidation {
        hints.push(RecoveryHint {
            label: "re-run skipping contract re-validation".to_string(),
            command: format!("{resume} --force"),
            kind: HintKind::Force,
        });
    }

    if let Some(path) = workspace {
        hints.push(RecoveryHint {
            label: format!("inspect the workspace of step {step_id}"),
            command: format!("ls -la {}", shell_quote(&path.display().to_string())),
            kind: HintKind::Workspace,
        });
    }

    if matches!(class, ErrorClass::Runtime | ErrorClass::Unknown) {
        hints.push(RecoveryHint {
            label: "inspect the run's event log".to_string(),
            command: format!("wave logs {}", shell_quote(run_id.as_str())),
            kind: HintKind::Debug,
        });
    }

    hints
}

#[cfg(test)]
#[path = "hints_tests.rs"]
mod tests;
