// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::stream::StreamEvent;
use crate::CancelToken;
use std::time::Duration;
use wave_core::{RunId, StepId};

/// Write an executable stub adapter script and return its path.
fn stub_adapter(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("stub-adapter");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

fn config(workspace: &Path, binary: PathBuf, timeout: Duration) -> RunConfig {
    RunConfig {
        run_id: RunId::new("run-1"),
        step_id: StepId::new("build"),
        persona: "builder".to_string(),
        workspace: workspace.to_owned(),
        prompt: "do the thing".to_string(),
        timeout,
        env_passthrough: Vec::new(),
        binary: Some(binary),
        cancel: CancelToken::default(),
    }
}

async fn run_stub(body: &str, timeout: Duration) -> Result<AdapterOutput, AdapterError> {
    let dir = tempfile::tempdir().unwrap();
    let binary = stub_adapter(dir.path(), body);
    let (tx, _rx) = mpsc::channel(64);
    ClaudeAdapter::new()
        .run(config(dir.path(), binary, timeout), tx)
        .await
}

#[tokio::test]
async fn run_parses_stream_and_accumulates_tokens() {
    let body = r#"
echo '{"type":"assistant","message":{"usage":{"output_tokens":10}}}'
echo '{"type":"assistant","message":{"usage":{"output_tokens":15}}}'
echo '{"type":"result","subtype":"success","result":"{\"done\":true}"}'
"#;
    let output = run_stub(body, Duration::from_secs(10)).await.unwrap();
    assert_eq!(output.tokens_used, 25);
    assert_eq!(output.output.unwrap()["done"], true);
}

#[tokio::test]
async fn result_total_overrides_smaller_accumulated_count() {
    let body = r#"
echo '{"type":"assistant","message":{"usage":{"output_tokens":10}}}'
echo '{"type":"result","subtype":"success","usage":{"output_tokens":99},"result":"ok"}'
"#;
    let output = run_stub(body, Duration::from_secs(10)).await.unwrap();
    assert_eq!(output.tokens_used, 99);
}

#[tokio::test]
async fn nonzero_exit_is_classified_with_partial_tokens() {
    let body = r#"
echo '{"type":"assistant","message":{"usage":{"output_tokens":7}}}'
exit 3
"#;
    let err = run_stub(body, Duration::from_secs(10)).await.unwrap_err();
    match err {
        AdapterError::NonzeroExit { code, tokens_used } => {
            assert_eq!(code, 3);
            assert_eq!(tokens_used, 7);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn missing_result_record_is_stream_parse_error() {
    let body = r#"
echo '{"type":"assistant","message":{"usage":{"output_tokens":1}}}'
"#;
    let err = run_stub(body, Duration::from_secs(10)).await.unwrap_err();
    assert!(matches!(err, AdapterError::StreamParse { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn error_result_with_context_subtype_is_context_exhausted() {
    let body = r#"
echo '{"type":"result","subtype":"error_context_exhausted","is_error":true}'
"#;
    let err = run_stub(body, Duration::from_secs(10)).await.unwrap_err();
    assert!(matches!(err, AdapterError::ContextExhausted { .. }));
    assert!(!err.is_retryable());
    assert!(err.remediation().is_some());
}

#[tokio::test]
async fn timeout_kills_process_and_reports_partial_tokens() {
    let body = r#"
echo '{"type":"assistant","message":{"usage":{"output_tokens":33}}}'
sleep 60
"#;
    let err = run_stub(body, Duration::from_millis(800)).await.unwrap_err();
    match err {
        AdapterError::Timeout { tokens_used } => assert_eq!(tokens_used, 33),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_terminates_the_subprocess() {
    let dir = tempfile::tempdir().unwrap();
    let body = r#"
echo '{"type":"assistant","message":{"usage":{"output_tokens":5}}}'
sleep 60
"#;
    let binary = stub_adapter(dir.path(), body);
    let cancel = CancelToken::new();
    let mut cfg = config(dir.path(), binary, Duration::from_secs(60));
    cfg.cancel = cancel.clone();

    let (tx, _rx) = mpsc::channel(8);
    let adapter = ClaudeAdapter::new();
    let handle = tokio::spawn(async move { adapter.run(cfg, tx).await });

    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();

    let err = handle.await.unwrap().unwrap_err();
    match err {
        AdapterError::Signal { tokens_used, .. } => assert_eq!(tokens_used, 5),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn missing_binary_is_spawn_failure() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, _rx) = mpsc::channel(8);
    let err = ClaudeAdapter::new()
        .run(
            config(
                dir.path(),
                dir.path().join("no-such-binary"),
                Duration::from_secs(1),
            ),
            tx,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::SpawnFailed(_)));
}

#[tokio::test]
async fn stream_events_are_forwarded_to_the_channel() {
    let dir = tempfile::tempdir().unwrap();
    let body = r#"
echo '{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Read","input":{"file_path":"/a"}}]}}'
echo '{"type":"result","subtype":"success","result":"ok"}'
"#;
    let binary = stub_adapter(dir.path(), body);
    let (tx, mut rx) = mpsc::channel(64);
    ClaudeAdapter::new()
        .run(config(dir.path(), binary, Duration::from_secs(10)), tx)
        .await
        .unwrap();

    let first = rx.recv().await.unwrap();
    assert!(matches!(first, StreamEvent::ToolUse { .. }));
    let second = rx.recv().await.unwrap();
    assert!(matches!(second, StreamEvent::Result { .. }));
}
