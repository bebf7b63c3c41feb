// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace preparation for adapter execution.
//!
//! Writes the per-step system prompt (`CLAUDE.md`), the adapter settings file
//! with the persona's permission lists, and stages skill command files into
//! the workspace's `.claude/commands/` directory.

use serde_json::json;
use std::io;
use std::path::Path;
use wave_core::{PersonaDef, SkillDef};

/// Base protocol prepended to every persona prompt.
pub const BASE_PROTOCOL: &str = "\
# Wave step protocol

You are executing one step of a Wave pipeline inside an isolated workspace.

- Inputs handed over from earlier steps are in `artifacts/`.
- Write your final result to `output/result.json`.
- Declared output artifacts must exist under this workspace when you finish.
- Do not modify files outside this workspace.
";

/// Write the workspace files for a step.
pub fn prepare_workspace(
    workspace: &Path,
    persona: &PersonaDef,
    skills: &[SkillDef],
) -> io::Result<()> {
    std::fs::create_dir_all(workspace.join("artifacts"))?;
    std::fs::create_dir_all(workspace.join("output"))?;
    std::fs::create_dir_all(workspace.join(".claude"))?;

    write_system_prompt(workspace, persona)?;
    write_settings(workspace, persona)?;
    stage_skill_commands(workspace, skills)?;
    Ok(())
}

/// CLAUDE.md = base protocol + persona prompt + restrictions.
fn write_system_prompt(workspace: &Path, persona: &PersonaDef) -> io::Result<()> {
    let mut prompt = String::from(BASE_PROTOCOL);
    prompt.push('\n');
    prompt.push_str(&persona.system_prompt);
    if !prompt.ends_with('\n') {
        prompt.push('\n');
    }

    if !persona.permissions.deny.is_empty() {
        prompt.push_str("\n# Restrictions\n\nYou must not use: ");
        prompt.push_str(&persona.permissions.deny.join(", "));
        prompt.push('\n');
    }

    std::fs::write(workspace.join("CLAUDE.md"), prompt)
}

/// Settings file consumed by the adapter (`--settings` style).
fn write_settings(workspace: &Path, persona: &PersonaDef) -> io::Result<()> {
    let settings = json!({
        "permissions": {
            "allow": persona.permissions.allowed_tools,
            "deny": persona.permissions.deny,
        }
    });
    let content = serde_json::to_string_pretty(&settings).unwrap_or_else(|_| "{}".to_string());
    std::fs::write(workspace.join(".claude/settings.json"), content)
}

/// Copy skill command files matching each skill's glob into the workspace.
fn stage_skill_commands(workspace: &Path, skills: &[SkillDef]) -> io::Result<()> {
    let commands_dir = workspace.join(".claude/commands");

    for skill in skills {
        let Some(pattern) = &skill.commands_glob else {
            continue;
        };
        let paths = match glob::glob(pattern) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(skill = %skill.name, error = %e, "invalid commands glob, skipping");
                continue;
            }
        };
        for entry in paths.flatten() {
            if !entry.is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name() else {
                continue;
            };
            std::fs::create_dir_all(&commands_dir)?;
            std::fs::copy(&entry, commands_dir.join(file_name))?;
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "prepare_tests.rs"]
mod tests;
