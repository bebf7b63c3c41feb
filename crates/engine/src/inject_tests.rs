// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use wave_core::test_support::{step, step_injecting};
use wave_core::{PipelineExecution, RunId, StepId};

fn exec_with_artifact(dir: &std::path::Path) -> PipelineExecution {
    let mut exec = PipelineExecution::new(RunId::new("run-1"), "demo", "", 1_000);
    let source = dir.join("plan.json");
    std::fs::write(&source, b"{\"plan\":1}").unwrap();
    exec.record_artifact(&StepId::new("plan"), "plan.json", source);
    exec
}

#[test]
fn copies_artifact_under_target_name() {
    let dir = tempfile::tempdir().unwrap();
    let exec = exec_with_artifact(dir.path());
    let ws = dir.path().join("ws");
    std::fs::create_dir_all(&ws).unwrap();

    let mut step = step_injecting("build", "plan", "plan.json");
    step.memory.inject_artifacts[0].target = "input-plan.json".to_string();

    let staged = inject_artifacts(&step, &exec, &ws).unwrap();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].0, "input-plan.json");

    let copied = ws.join("artifacts/input-plan.json");
    assert_eq!(std::fs::read(&copied).unwrap(), b"{\"plan\":1}");
}

#[test]
fn copy_is_isolated_from_later_source_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let exec = exec_with_artifact(dir.path());
    let ws = dir.path().join("ws");
    std::fs::create_dir_all(&ws).unwrap();

    let step = step_injecting("build", "plan", "plan.json");
    inject_artifacts(&step, &exec, &ws).unwrap();

    // Mutate the source after injection.
    std::fs::write(dir.path().join("plan.json"), b"{\"plan\":2}").unwrap();

    let copied = ws.join("artifacts/plan.json");
    assert_eq!(std::fs::read(&copied).unwrap(), b"{\"plan\":1}");
}

#[test]
fn missing_artifact_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let exec = PipelineExecution::new(RunId::new("run-1"), "demo", "", 1_000);
    let ws = dir.path().join("ws");
    std::fs::create_dir_all(&ws).unwrap();

    let step = step_injecting("build", "plan", "plan.json");
    let err = inject_artifacts(&step, &exec, &ws).unwrap_err();
    match err {
        RuntimeError::ArtifactMissing { step, artifact } => {
            assert_eq!(step, "plan");
            assert_eq!(artifact, "plan.json");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn step_without_injections_copies_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let exec = exec_with_artifact(dir.path());
    let ws = dir.path().join("ws");
    std::fs::create_dir_all(&ws).unwrap();

    let staged = inject_artifacts(&step("build"), &exec, &ws).unwrap();
    assert!(staged.is_empty());
    assert!(!ws.join("artifacts").exists());
}
