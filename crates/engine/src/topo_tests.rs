// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use wave_core::test_support::{pipeline, step, step_depending_on, step_injecting};
use wave_core::MatrixStrategy;

fn ids(steps: &[StepId]) -> Vec<&str> {
    steps.iter().map(|s| s.as_str()).collect()
}

#[test]
fn chain_sorts_in_dependency_order() {
    // Declared out of order on purpose.
    let p = pipeline(
        "demo",
        vec![
            step_depending_on("c", &["b"]),
            step_depending_on("b", &["a"]),
            step("a"),
        ],
    );
    assert_eq!(ids(&topo_sort(&p).unwrap()), vec!["a", "b", "c"]);
}

#[test]
fn independent_steps_keep_declaration_order() {
    let p = pipeline("demo", vec![step("x"), step("a"), step("m")]);
    assert_eq!(ids(&topo_sort(&p).unwrap()), vec!["x", "a", "m"]);
}

#[test]
fn diamond_is_deterministic() {
    let p = pipeline(
        "demo",
        vec![
            step("a"),
            step_depending_on("b", &["a"]),
            step_depending_on("c", &["a"]),
            step_depending_on("d", &["b", "c"]),
        ],
    );
    assert_eq!(ids(&topo_sort(&p).unwrap()), vec!["a", "b", "c", "d"]);
}

#[test]
fn injection_sources_are_edges_too() {
    let p = pipeline(
        "demo",
        vec![step_injecting("b", "a", "out.json"), step("a")],
    );
    assert_eq!(ids(&topo_sort(&p).unwrap()), vec!["a", "b"]);
}

#[test]
fn cycle_is_detected_and_names_members() {
    let p = pipeline(
        "demo",
        vec![
            step_depending_on("a", &["c"]),
            step_depending_on("b", &["a"]),
            step_depending_on("c", &["b"]),
        ],
    );
    match topo_sort(&p).unwrap_err() {
        RuntimeError::CyclicDependency(members) => {
            assert!(members.contains('a') && members.contains('b') && members.contains('c'));
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn self_dependency_is_a_cycle() {
    let p = pipeline("demo", vec![step_depending_on("a", &["a"])]);
    assert!(matches!(
        topo_sort(&p),
        Err(RuntimeError::CyclicDependency(_))
    ));
}

#[test]
fn unknown_reference_is_rejected() {
    let p = pipeline("demo", vec![step_depending_on("a", &["ghost"])]);
    assert!(matches!(topo_sort(&p), Err(RuntimeError::UnknownStep(_))));
}

// ── Matrix expansion ────────────────────────────────────────────────────────

fn matrix_step(id: &str, workers: u32) -> StepDef {
    let mut s = step(id);
    s.strategy = Some(MatrixStrategy { workers });
    s
}

#[test]
fn matrix_step_expands_into_clones() {
    let p = pipeline("demo", vec![matrix_step("shard", 3)]);
    let steps = runtime_steps(&p).unwrap();
    let names: Vec<&str> = steps.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(
        names,
        vec!["shard[worker-0]", "shard[worker-1]", "shard[worker-2]"]
    );
    assert!(steps.iter().all(|s| s.strategy.is_none()));
}

#[test]
fn downstream_dependency_on_matrix_step_fans_out() {
    let p = pipeline(
        "demo",
        vec![matrix_step("shard", 2), step_depending_on("merge", &["shard"])],
    );
    let steps = runtime_steps(&p).unwrap();
    let merge = steps.iter().find(|s| s.id == "merge").unwrap();
    let deps: Vec<&str> = merge.dependencies.iter().map(|d| d.as_str()).collect();
    assert_eq!(deps, vec!["shard[worker-0]", "shard[worker-1]"]);
}

#[test]
fn injection_from_matrix_step_resolves_to_worker_zero() {
    let p = pipeline(
        "demo",
        vec![matrix_step("shard", 2), step_injecting("merge", "shard", "part.json")],
    );
    let steps = runtime_steps(&p).unwrap();
    let merge = steps.iter().find(|s| s.id == "merge").unwrap();
    assert_eq!(
        merge.memory.inject_artifacts[0].step,
        "shard[worker-0]"
    );
}

#[test]
fn single_worker_matrix_is_not_expanded() {
    let p = pipeline("demo", vec![matrix_step("shard", 1)]);
    let steps = runtime_steps(&p).unwrap();
    assert_eq!(steps[0].id, "shard");
}
