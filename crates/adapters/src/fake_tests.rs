// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;
use wave_core::test_support::builder_persona;
use wave_core::RunId;

fn config(workspace: &Path, step: &str) -> RunConfig {
    RunConfig {
        run_id: RunId::new("run-1"),
        step_id: StepId::new(step),
        persona: "builder".to_string(),
        workspace: workspace.to_owned(),
        prompt: "go".to_string(),
        timeout: Duration::from_secs(5),
        env_passthrough: Vec::new(),
        binary: None,
        cancel: crate::CancelToken::default(),
    }
}

#[tokio::test]
async fn default_run_succeeds_and_writes_result_file() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeAdapter::new();
    let (tx, _rx) = mpsc::channel(8);

    let output = fake.run(config(dir.path(), "a"), tx).await.unwrap();
    assert_eq!(output.tokens_used, 10);
    assert!(dir.path().join("output/result.json").is_file());
}

#[tokio::test]
async fn scripted_results_play_back_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeAdapter::new();
    fake.enqueue_error("a", AdapterError::Timeout { tokens_used: 5 });
    fake.enqueue_success("a", serde_json::json!({"n": 2}), 20);

    let (tx, _rx) = mpsc::channel(8);
    let first = fake.run(config(dir.path(), "a"), tx.clone()).await;
    assert!(matches!(first, Err(AdapterError::Timeout { .. })));

    let second = fake.run(config(dir.path(), "a"), tx).await.unwrap();
    assert_eq!(second.tokens_used, 20);
    assert_eq!(fake.run_count("a"), 2);
}

#[tokio::test]
async fn prepare_records_call_and_creates_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeAdapter::new();
    fake.prepare(dir.path(), &builder_persona(), &[]).await.unwrap();

    assert!(dir.path().join("artifacts").is_dir());
    assert!(matches!(fake.calls()[0], FakeCall::Prepare { .. }));
}

#[tokio::test]
async fn scripted_stream_events_are_sent() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeAdapter::new();
    fake.set_stream_events(
        "a",
        vec![StreamEvent::TokenUsage { delta: 4 }],
    );

    let (tx, mut rx) = mpsc::channel(8);
    fake.run(config(dir.path(), "a"), tx).await.unwrap();
    assert_eq!(rx.recv().await, Some(StreamEvent::TokenUsage { delta: 4 }));
}
