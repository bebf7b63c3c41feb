// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topological scheduling order.
//!
//! Edges are the union of ordering `dependencies` and `inject_artifacts`
//! sources. The sort is Kahn's algorithm with declaration order breaking
//! ties, so schedules are deterministic. Cycles are fatal before any step
//! runs. After sorting, matrix steps expand into their runtime clones.

use crate::error::RuntimeError;
use std::collections::{HashMap, HashSet};
use wave_core::{PipelineDef, StepDef, StepId};

/// Sort declared steps; returns IDs in schedule order.
pub fn topo_sort(pipeline: &PipelineDef) -> Result<Vec<StepId>, RuntimeError> {
    let order: HashMap<&StepId, usize> = pipeline
        .step_ids()
        .enumerate()
        .map(|(i, id)| (id, i))
        .collect();

    // Validate references before building the graph.
    for step in &pipeline.steps {
        for dep in step.upstream() {
            if !order.contains_key(dep) {
                return Err(RuntimeError::UnknownStep(format!(
                    "step {} references {}",
                    step.id, dep
                )));
            }
            if *dep == step.id {
                return Err(RuntimeError::CyclicDependency(step.id.to_string()));
            }
        }
    }

    let mut in_degree: HashMap<&StepId, usize> = HashMap::new();
    let mut downstream: HashMap<&StepId, Vec<&StepId>> = HashMap::new();
    for step in &pipeline.steps {
        let upstream = step.upstream();
        in_degree.insert(&step.id, upstream.len());
        for dep in upstream {
            downstream.entry(dep).or_default().push(&step.id);
        }
    }

    let mut ready: Vec<&StepId> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| *id)
        .collect();
    ready.sort_by_key(|id| order[id]);

    let mut sorted = Vec::with_capacity(pipeline.steps.len());
    while let Some(next) = ready.first().copied() {
        ready.remove(0);
        sorted.push(next.clone());

        for dependent in downstream.remove(next).unwrap_or_default() {
            let degree = in_degree.entry(dependent).or_insert(0);
            *degree = degree.saturating_sub(1);
            if *degree == 0 {
                let pos = ready
                    .binary_search_by_key(&order[dependent], |id| order[id])
                    .unwrap_or_else(|p| p);
                ready.insert(pos, dependent);
            }
        }
    }

    if sorted.len() != pipeline.steps.len() {
        let sorted_set: HashSet<&str> = sorted.iter().map(|id| id.as_str()).collect();
        let mut cycle: Vec<&str> = pipeline
            .step_ids()
            .map(|id| id.as_str())
            .filter(|id| !sorted_set.contains(id))
            .collect();
        cycle.sort_unstable();
        return Err(RuntimeError::CyclicDependency(cycle.join(", ")));
    }

    Ok(sorted)
}

/// Runtime step list: schedule order with matrix steps expanded.
///
/// A matrix step with `workers = N` becomes N clones `id[worker-k]`, each
/// inheriting the declared configuration. Downstream ordering dependencies on
/// the base ID expand to all clones; artifact injections referencing the base
/// ID resolve to worker 0.
pub fn runtime_steps(pipeline: &PipelineDef) -> Result<Vec<StepDef>, RuntimeError> {
    let sorted = topo_sort(pipeline)?;

    let matrix_workers: HashMap<&StepId, u32> = pipeline
        .steps
        .iter()
        .filter_map(|s| {
            s.strategy
                .as_ref()
                .filter(|m| m.workers > 1)
                .map(|m| (&s.id, m.workers))
        })
        .collect();

    let mut runtime = Vec::new();
    for id in &sorted {
        let step = pipeline
            .get_step(id)
            .ok_or_else(|| RuntimeError::UnknownStep(id.to_string()))?;

        match matrix_workers.get(id) {
            Some(&workers) => {
                for k in 0..workers {
                    let mut clone = step.clone();
                    clone.id = id.matrix_clone(k);
                    clone.strategy = None;
                    rewrite_references(&mut clone, &matrix_workers);
                    runtime.push(clone);
                }
            }
            None => {
                let mut step = step.clone();
                rewrite_references(&mut step, &matrix_workers);
                runtime.push(step);
            }
        }
    }

    Ok(runtime)
}

fn rewrite_references(step: &mut StepDef, matrix_workers: &HashMap<&StepId, u32>) {
    let mut deps = Vec::new();
    for dep in std::mem::take(&mut step.dependencies) {
        match matrix_workers.get(&dep) {
            Some(&workers) => deps.extend((0..workers).map(|k| dep.matrix_clone(k))),
            None => deps.push(dep),
        }
    }
    step.dependencies = deps;

    for injection in &mut step.memory.inject_artifacts {
        if matrix_workers.contains_key(&injection.step) {
            injection.step = injection.step.matrix_clone(0);
        }
    }
}

#[cfg(test)]
#[path = "topo_tests.rs"]
mod tests;
