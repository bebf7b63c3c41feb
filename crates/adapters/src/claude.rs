// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claude adapter implementation.
//!
//! Spawns the adapter binary headless (`-p --output-format stream-json`) in
//! its own process group with a curated environment, parses its NDJSON
//! stream, and enforces the step timeout with a SIGTERM → grace → SIGKILL
//! escalation on the whole group.

use crate::env::curated_env;
use crate::prepare::prepare_workspace;
use crate::stream::{classify_error_subtype, parse_line, StreamEvent};
use crate::{Adapter, AdapterError, AdapterOutput, RunConfig};
use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;
use wave_core::{FailureReason, PersonaDef, SkillDef};

/// Grace period between SIGTERM and SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(3);

/// Budget for draining buffered output after a kill.
const DRAIN_BUDGET: Duration = Duration::from_millis(500);

/// Adapter invoking the Claude CLI.
#[derive(Debug, Clone, Default)]
pub struct ClaudeAdapter;

impl ClaudeAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Adapter for ClaudeAdapter {
    async fn prepare(
        &self,
        workspace: &Path,
        persona: &PersonaDef,
        skills: &[SkillDef],
    ) -> Result<(), AdapterError> {
        prepare_workspace(workspace, persona, skills)
            .map_err(|e| AdapterError::WorkspaceError(e.to_string()))
    }

    async fn run(
        &self,
        config: RunConfig,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<AdapterOutput, AdapterError> {
        let binary = config
            .binary
            .clone()
            .unwrap_or_else(|| PathBuf::from("claude"));

        tracing::debug!(
            run_id = %config.run_id,
            step_id = %config.step_id,
            binary = %binary.display(),
            workspace = %config.workspace.display(),
            "spawning adapter"
        );

        let mut cmd = Command::new(&binary);
        cmd.arg("-p")
            .arg(&config.prompt)
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .current_dir(&config.workspace)
            .env_clear()
            .envs(curated_env(&config.env_passthrough))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| AdapterError::SpawnFailed(format!("{}: {}", binary.display(), e)))?;

        let pid = child.id();

        // Drain stderr in the background; surfaced via tracing on failure.
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    buf.push_str(&line);
                    buf.push('\n');
                }
                buf
            })
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AdapterError::SpawnFailed("stdout not captured".to_string()))?;
        let mut reader = BufReader::new(stdout).lines();

        let deadline = Instant::now() + config.timeout;
        let mut parsed = ParsedStream::default();
        let mut timed_out = false;
        let mut cancelled = false;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                timed_out = true;
                break;
            }
            tokio::select! {
                _ = config.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                read = tokio::time::timeout(remaining, reader.next_line()) => match read {
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                    Ok(Ok(None)) => break,
                    Ok(Ok(Some(line))) => parsed.feed(&line, &events),
                    Ok(Err(e)) => {
                        tracing::warn!(step_id = %config.step_id, error = %e, "adapter stdout read failed");
                        break;
                    }
                },
            }
        }

        if timed_out || cancelled {
            terminate_group(pid, &mut child).await;
            // Final pass over whatever the adapter managed to flush, so
            // partial token usage is still reported.
            parsed.drain(&mut reader, &events).await;
            tracing::warn!(
                run_id = %config.run_id,
                step_id = %config.step_id,
                tokens_used = parsed.tokens,
                cancelled,
                "adapter terminated early"
            );
            if cancelled {
                return Err(AdapterError::Signal {
                    signal: nix::libc::SIGTERM,
                    tokens_used: parsed.tokens,
                });
            }
            return Err(AdapterError::Timeout {
                tokens_used: parsed.tokens,
            });
        }

        let status = match tokio::time::timeout(TERM_GRACE, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(AdapterError::SpawnFailed(format!("wait failed: {}", e))),
            Err(_) => {
                // Stream closed but the process lingers.
                terminate_group(pid, &mut child).await;
                return Err(AdapterError::Timeout {
                    tokens_used: parsed.tokens,
                });
            }
        };

        if !status.success() {
            if let Some(task) = stderr_task {
                if let Ok(stderr) = task.await {
                    if !stderr.trim().is_empty() {
                        tracing::warn!(step_id = %config.step_id, stderr = %stderr, "adapter stderr");
                    }
                }
            }
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                if let Some(signal) = status.signal() {
                    return Err(AdapterError::Signal {
                        signal,
                        tokens_used: parsed.tokens,
                    });
                }
            }
            return Err(AdapterError::NonzeroExit {
                code: status.code().unwrap_or(-1),
                tokens_used: parsed.tokens,
            });
        }

        parsed.into_output()
    }
}

/// Running state accumulated over the stream.
#[derive(Default)]
struct ParsedStream {
    tokens: u64,
    saw_lines: bool,
    result: Option<TerminalResult>,
}

struct TerminalResult {
    subtype: Option<String>,
    output: Option<serde_json::Value>,
    is_error: bool,
}

impl ParsedStream {
    fn feed(&mut self, line: &str, events: &mpsc::Sender<StreamEvent>) {
        if !line.trim().is_empty() {
            self.saw_lines = true;
        }
        let Some(event) = parse_line(line) else {
            return;
        };
        match &event {
            StreamEvent::TokenUsage { delta } => self.tokens += delta,
            StreamEvent::Result {
                subtype,
                tokens,
                output,
                is_error,
            } => {
                if let Some(total) = tokens {
                    self.tokens = self.tokens.max(*total);
                }
                self.result = Some(TerminalResult {
                    subtype: subtype.clone(),
                    output: output.clone(),
                    is_error: *is_error,
                });
            }
            StreamEvent::Delta { .. } | StreamEvent::ToolUse { .. } => {}
        }
        // Slow consumers drop events; the stream itself is never blocked.
        let _ = events.try_send(event);
    }

    /// One bounded pass over buffered output after a kill.
    async fn drain(
        &mut self,
        reader: &mut Lines<BufReader<ChildStdout>>,
        events: &mpsc::Sender<StreamEvent>,
    ) {
        let deadline = Instant::now() + DRAIN_BUDGET;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            match tokio::time::timeout(remaining, reader.next_line()).await {
                Ok(Ok(Some(line))) => self.feed(&line, events),
                _ => return,
            }
        }
    }

    fn into_output(self) -> Result<AdapterOutput, AdapterError> {
        let Some(result) = self.result else {
            let message = if self.saw_lines {
                "stream ended without a result record".to_string()
            } else {
                "adapter produced no output".to_string()
            };
            return Err(AdapterError::StreamParse {
                message,
                tokens_used: self.tokens,
            });
        };

        if result.is_error {
            let reason = result
                .subtype
                .as_deref()
                .and_then(classify_error_subtype)
                .unwrap_or(FailureReason::NonzeroExit);
            return Err(match reason {
                FailureReason::ContextExhausted => AdapterError::ContextExhausted {
                    tokens_used: self.tokens,
                },
                _ => AdapterError::NonzeroExit {
                    code: 0,
                    tokens_used: self.tokens,
                },
            });
        }

        Ok(AdapterOutput {
            tokens_used: self.tokens,
            output: result.output,
        })
    }
}

/// SIGTERM the process group, wait out the grace period, then SIGKILL.
async fn terminate_group(pid: Option<u32>, child: &mut Child) {
    let Some(pid) = pid else {
        return;
    };
    let pgid = Pid::from_raw(pid as i32);

    if let Err(e) = killpg(pgid, Signal::SIGTERM) {
        tracing::debug!(pid, error = %e, "SIGTERM failed (process may have exited)");
    }

    if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_ok() {
        return;
    }

    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        tracing::debug!(pid, error = %e, "SIGKILL failed");
    }
    let _ = child.wait().await;
}

#[cfg(test)]
#[path = "claude_tests.rs"]
mod tests;
