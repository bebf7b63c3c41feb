// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::manifest::{Permissions, PersonaDef};
use crate::pipeline::{
    ArtifactDecl, ArtifactInjection, PipelineDef, Requires, StepDef, StepId, WorkspaceConfig,
};

// ── Definition builders ─────────────────────────────────────────────────────

/// A minimal step running under the "builder" persona.
pub fn step(id: &str) -> StepDef {
    StepDef {
        id: StepId::new(id),
        persona: "builder".to_string(),
        dependencies: Vec::new(),
        optional: false,
        memory: Default::default(),
        workspace: WorkspaceConfig::EphemeralDir,
        exec: Default::default(),
        output_artifacts: Vec::new(),
        contract: None,
        strategy: None,
    }
}

pub fn optional_step(id: &str) -> StepDef {
    StepDef {
        optional: true,
        ..step(id)
    }
}

/// Step with ordering dependencies only (no artifact hand-over).
pub fn step_depending_on(id: &str, deps: &[&str]) -> StepDef {
    StepDef {
        dependencies: deps.iter().map(|d| StepId::new(*d)).collect(),
        ..step(id)
    }
}

/// Step consuming `artifact` from `source` under the same name.
pub fn step_injecting(id: &str, source: &str, artifact: &str) -> StepDef {
    let mut s = step(id);
    s.memory.inject_artifacts.push(ArtifactInjection {
        step: StepId::new(source),
        artifact: artifact.to_string(),
        target: artifact.to_string(),
    });
    s
}

/// Step declaring a single required output artifact.
pub fn step_producing(id: &str, artifact: &str, pattern: &str) -> StepDef {
    let mut s = step(id);
    s.output_artifacts.push(ArtifactDecl {
        name: artifact.to_string(),
        path_pattern: pattern.to_string(),
        required: true,
    });
    s
}

pub fn pipeline(name: &str, steps: Vec<StepDef>) -> PipelineDef {
    PipelineDef {
        name: name.to_string(),
        description: None,
        requires: Requires::default(),
        steps,
    }
}

/// The default persona used by the step builders.
pub fn builder_persona() -> PersonaDef {
    PersonaDef {
        name: "builder".to_string(),
        adapter: "claude".to_string(),
        description: "test persona".to_string(),
        system_prompt: "You are a builder.".to_string(),
        temperature: None,
        permissions: Permissions {
            allowed_tools: vec!["Read".to_string(), "Write".to_string()],
            deny: Vec::new(),
        },
    }
}
