// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use wave_adapters::FakeAdapter;
use wave_core::test_support::{builder_persona, pipeline, step, step_depending_on};
use wave_core::{FakeClock, SequentialIdGen, StepState};

fn runner(dir: &std::path::Path) -> Runner<FakeAdapter, FakeClock, SequentialIdGen> {
    Runner::new(
        FakeAdapter::new(),
        FakeClock::new(1_000),
        SequentialIdGen::new("run"),
        RunnerConfig::in_dir(dir),
        vec![builder_persona()],
        Vec::new(),
    )
    .unwrap()
}

fn demo_pipeline() -> PipelineDef {
    pipeline("demo", vec![step("a"), step_depending_on("b", &["a"])])
}

#[tokio::test]
async fn execute_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let r = runner(dir.path());
    let mut rx = r.subscribe();

    let outcome = r
        .execute(&demo_pipeline(), "go", ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.run_id, "run-1");
    assert!(outcome.hints.is_empty());

    let run = r.reader().unwrap().get_run(&outcome.run_id).unwrap().unwrap();
    assert_eq!(run.state, RunState::Completed);
    assert!(run.completed_at_ms.is_some());

    let mut types = Vec::new();
    while let Ok(event) = rx.try_recv() {
        types.push(event.event_type());
    }
    assert_eq!(types.first(), Some(&"pipeline_start"));
    assert_eq!(types.last(), Some(&"pipeline_complete"));
}

#[tokio::test]
async fn run_ids_are_stable_and_sequential_records_exist() {
    let dir = tempfile::tempdir().unwrap();
    let r = runner(dir.path());

    r.execute(&demo_pipeline(), "one", ExecuteOptions::default())
        .await
        .unwrap();
    r.execute(&demo_pipeline(), "two", ExecuteOptions::default())
        .await
        .unwrap();

    let runs = r.reader().unwrap().list_runs().unwrap();
    assert_eq!(runs.len(), 2);
}

#[tokio::test]
async fn cyclic_pipeline_fails_before_creating_a_run() {
    let dir = tempfile::tempdir().unwrap();
    let r = runner(dir.path());
    let p = pipeline(
        "cyclic",
        vec![
            step_depending_on("a", &["b"]),
            step_depending_on("b", &["a"]),
        ],
    );

    let err = r
        .execute(&p, "go", ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::CyclicDependency(_)));
    assert!(r.reader().unwrap().list_runs().unwrap().is_empty());
}

#[tokio::test]
async fn preflight_failure_aborts_before_any_step() {
    let dir = tempfile::tempdir().unwrap();
    let r = runner(dir.path());
    let mut p = demo_pipeline();
    p.requires.tools.push("wave-no-such-tool-9000".to_string());

    let err = r
        .execute(&p, "go", ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Preflight(_)));

    let runs = r.reader().unwrap().list_runs().unwrap();
    assert_eq!(runs[0].state, RunState::Failed);
    assert!(r
        .reader()
        .unwrap()
        .get_step_states(&runs[0].run_id)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn failed_run_reports_hints_and_resume_completes_it() {
    let dir = tempfile::tempdir().unwrap();
    let r = runner(dir.path());
    r.ctx.adapter.enqueue_error(
        "a",
        wave_adapters::AdapterError::NonzeroExit {
            code: 1,
            tokens_used: 0,
        },
    );

    let failed = r
        .execute(&demo_pipeline(), "go", ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(failed.state, RunState::Failed);
    assert!(failed
        .hints
        .iter()
        .any(|h| h.kind == crate::hints::HintKind::Resume));

    let states = r
        .reader()
        .unwrap()
        .get_step_states(&failed.run_id)
        .unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].state, StepState::Failed);

    // Second attempt succeeds on resume; `b` runs for the first time.
    let resumed = r
        .resume(&demo_pipeline(), &failed.run_id, ResumeOptions::default())
        .await
        .unwrap();
    assert_eq!(resumed.state, RunState::Completed);
    assert_eq!(r.ctx.adapter.run_count("a"), 2);
    assert_eq!(r.ctx.adapter.run_count("b"), 1);
}

#[tokio::test]
async fn resuming_a_completed_run_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let r = runner(dir.path());

    let done = r
        .execute(&demo_pipeline(), "go", ExecuteOptions::default())
        .await
        .unwrap();

    let mut rx = r.subscribe();
    let again = r
        .resume(&demo_pipeline(), &done.run_id, ResumeOptions::default())
        .await
        .unwrap();

    assert_eq!(again.state, RunState::Completed);
    assert_eq!(r.ctx.adapter.run_count("a"), 1);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn from_step_without_prior_run_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let r = runner(dir.path());

    let err = r
        .execute(
            &demo_pipeline(),
            "go",
            ExecuteOptions {
                from_step: Some(wave_core::StepId::new("a")),
                force: false,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::RunNotFound(_)));
}

#[tokio::test]
async fn resume_with_unknown_from_step_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let r = runner(dir.path());
    r.ctx.adapter.enqueue_error(
        "a",
        wave_adapters::AdapterError::NonzeroExit {
            code: 1,
            tokens_used: 0,
        },
    );
    let failed = r
        .execute(&demo_pipeline(), "go", ExecuteOptions::default())
        .await
        .unwrap();

    let err = r
        .resume(
            &demo_pipeline(),
            &failed.run_id,
            ResumeOptions {
                from_step: Some(wave_core::StepId::new("ghost")),
                force: false,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::UnknownStep(_)));
}

#[tokio::test]
async fn event_log_is_written_per_run() {
    let dir = tempfile::tempdir().unwrap();
    let r = runner(dir.path());

    let outcome = r
        .execute(&demo_pipeline(), "go", ExecuteOptions::default())
        .await
        .unwrap();

    let log_dir = dir.path().join(".wave/logs");
    let entries: Vec<_> = std::fs::read_dir(&log_dir).unwrap().flatten().collect();
    assert_eq!(entries.len(), 1);
    let name = entries[0].file_name().to_string_lossy().to_string();
    assert!(name.starts_with(outcome.run_id.as_str()));

    let lines = wave_storage::read_lines(&entries[0].path()).unwrap();
    assert!(lines.iter().any(|l| l["type"] == "pipeline_complete"));
}
