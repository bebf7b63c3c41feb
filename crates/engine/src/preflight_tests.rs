// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{drain_events, test_ctx};
use wave_core::Event;

fn requires(tools: &[&str], skills: &[&str]) -> Requires {
    Requires {
        tools: tools.iter().map(|t| t.to_string()).collect(),
        skills: skills.iter().map(|s| s.to_string()).collect(),
    }
}

fn skill(name: &str, check: &str, install: Option<&str>) -> SkillDef {
    SkillDef {
        name: name.to_string(),
        check: check.to_string(),
        install: install.map(String::from),
        init: None,
        commands_glob: None,
    }
}

#[tokio::test]
async fn present_tools_pass() {
    let t = test_ctx();
    let run_id = RunId::new("run-1");
    let result = run_preflight(
        &requires(&["sh"], &[]),
        &HashMap::new(),
        &t.ctx.emitter,
        &run_id,
        &t.ctx.clock,
    )
    .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn missing_tool_aborts() {
    let t = test_ctx();
    let mut rx = t.ctx.emitter.subscribe();
    let run_id = RunId::new("run-1");

    let err = run_preflight(
        &requires(&["wave-no-such-tool-3141"], &[]),
        &HashMap::new(),
        &t.ctx.emitter,
        &run_id,
        &t.ctx.clock,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, RuntimeError::Preflight(_)));
    let events = drain_events(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Preflight { .. })));
}

#[tokio::test]
async fn passing_skill_check_is_enough() {
    let t = test_ctx();
    let run_id = RunId::new("run-1");
    let skills = HashMap::from([("fmt".to_string(), skill("fmt", "true", None))]);

    let result = run_preflight(
        &requires(&[], &["fmt"]),
        &skills,
        &t.ctx.emitter,
        &run_id,
        &t.ctx.clock,
    )
    .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn failing_check_without_install_aborts() {
    let t = test_ctx();
    let run_id = RunId::new("run-1");
    let skills = HashMap::from([("fmt".to_string(), skill("fmt", "false", None))]);

    let err = run_preflight(
        &requires(&[], &["fmt"]),
        &skills,
        &t.ctx.emitter,
        &run_id,
        &t.ctx.clock,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RuntimeError::Preflight(_)));
}

#[tokio::test]
async fn install_then_recheck_succeeds() {
    let t = test_ctx();
    let run_id = RunId::new("run-1");
    let marker = t.dir.path().join("installed");
    let check = format!("test -f {}", marker.display());
    let install = format!("touch {}", marker.display());
    let skills = HashMap::from([(
        "fmt".to_string(),
        skill("fmt", &check, Some(install.as_str())),
    )]);
    let mut rx = t.ctx.emitter.subscribe();

    let result = run_preflight(
        &requires(&[], &["fmt"]),
        &skills,
        &t.ctx.emitter,
        &run_id,
        &t.ctx.clock,
    )
    .await;
    assert!(result.is_ok());
    assert!(marker.is_file());

    let statuses: Vec<String> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            Event::Preflight { data, .. } => {
                data.get("status").and_then(|s| s.as_str()).map(String::from)
            }
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec!["installing", "installed"]);
}

#[tokio::test]
async fn init_runs_after_first_install() {
    let t = test_ctx();
    let run_id = RunId::new("run-1");
    let marker = t.dir.path().join("installed");
    let init_marker = t.dir.path().join("initialised");
    let mut def = skill(
        "fmt",
        &format!("test -f {}", marker.display()),
        Some(&format!("touch {}", marker.display())),
    );
    def.init = Some(format!("touch {}", init_marker.display()));
    let skills = HashMap::from([("fmt".to_string(), def)]);

    run_preflight(
        &requires(&[], &["fmt"]),
        &skills,
        &t.ctx.emitter,
        &run_id,
        &t.ctx.clock,
    )
    .await
    .unwrap();
    assert!(init_marker.is_file());
}

#[tokio::test]
async fn required_skill_missing_from_manifest_aborts() {
    let t = test_ctx();
    let run_id = RunId::new("run-1");

    let err = run_preflight(
        &requires(&[], &["ghost"]),
        &HashMap::new(),
        &t.ctx.emitter,
        &run_id,
        &t.ctx.clock,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("ghost"));
}
