// SPDX-License-Identifier: MIT

use std::collections::HashSet;

use zallet_core::JobGraphSpec;

/// A deterministic depth-first execution order, starting from jobs with no
/// `needs`, visiting each job exactly once. Used for status/UI reporting,
/// not by the executor (which schedules by dependency-future, not a
/// precomputed order) — spec.md §4.B.
pub fn topo_order(spec: &JobGraphSpec) -> Vec<String> {
    let mut visited = HashSet::new();
    let mut order = Vec::with_capacity(spec.jobs.len());

    let roots: Vec<&String> = spec
        .jobs
        .iter()
        .filter(|(_, job)| job.needs.is_empty())
        .map(|(name, _)| name)
        .collect();
    for root in roots {
        visit(spec, root, &mut visited, &mut order);
    }
    // Defensive: an invalid graph (e.g. a cycle with no root) would leave
    // nodes unvisited; still emit them so callers get a complete order.
    for name in spec.jobs.keys() {
        visit(spec, name, &mut visited, &mut order);
    }
    order
}

fn visit(spec: &JobGraphSpec, name: &str, visited: &mut HashSet<String>, order: &mut Vec<String>) {
    if !visited.insert(name.to_string()) {
        return;
    }
    order.push(name.to_string());
    for (other_name, other_job) in &spec.jobs {
        if other_job.needs.iter().any(|n| n == name) {
            visit(spec, other_name, visited, order);
        }
    }
}
