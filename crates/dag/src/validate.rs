// SPDX-License-Identifier: MIT

use std::collections::HashMap;

use zallet_core::JobGraphSpec;

use crate::error::DagError;

/// Rejects: empty job set, malformed job names, dangling `needs`,
/// self-references, jobs with no steps, and any cycle in the `needs` graph.
pub fn validate(spec: &JobGraphSpec) -> Result<(), DagError> {
    match validate_inner(spec) {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::debug!(error = %err, "job graph rejected");
            Err(err)
        }
    }
}

fn validate_inner(spec: &JobGraphSpec) -> Result<(), DagError> {
    if spec.jobs.is_empty() {
        return Err(DagError::EmptyJobs);
    }
    for name in spec.jobs.keys() {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(DagError::InvalidJobName(name.clone()));
        }
    }
    for (name, job) in &spec.jobs {
        if job.steps.is_empty() {
            return Err(DagError::NoSteps(name.clone()));
        }
        for need in &job.needs {
            if need == name {
                return Err(DagError::SelfNeed(need.clone()));
            }
            if !spec.jobs.contains_key(need) {
                return Err(DagError::DanglingNeed(need.clone()));
            }
        }
    }
    detect_cycle(spec)
}

/// Cycle detection per spec.md §4.B: build forward edges (needs -> its
/// dependents), start a depth-first walk over each job's own `needs` from
/// every job with an empty dependent set, and flag a revisit of a node
/// already on the current path. If every job has at least one dependent
/// (a cycle spans the whole graph), fall back to starting from every node.
fn detect_cycle(spec: &JobGraphSpec) -> Result<(), DagError> {
    let mut dependents: HashMap<&str, usize> = spec.jobs.keys().map(|k| (k.as_str(), 0)).collect();
    for job in spec.jobs.values() {
        for need in &job.needs {
            if let Some(count) = dependents.get_mut(need.as_str()) {
                *count += 1;
            }
        }
    }

    let sinks: Vec<&str> = spec
        .jobs
        .keys()
        .map(String::as_str)
        .filter(|name| dependents[name] == 0)
        .collect();
    let starts: Vec<&str> = if sinks.is_empty() {
        spec.jobs.keys().map(String::as_str).collect()
    } else {
        sinks
    };

    for start in starts {
        let mut path = Vec::new();
        walk_needs(spec, start, &mut path)?;
    }
    Ok(())
}

fn walk_needs<'a>(
    spec: &'a JobGraphSpec,
    name: &'a str,
    path: &mut Vec<&'a str>,
) -> Result<(), DagError> {
    if path.contains(&name) {
        let mut trail = path.clone();
        trail.push(name);
        return Err(DagError::Cycle(trail.join(" -> ")));
    }
    path.push(name);
    if let Some(job) = spec.jobs.get(name) {
        for need in &job.needs {
            walk_needs(spec, need.as_str(), path)?;
        }
    }
    path.pop();
    Ok(())
}
