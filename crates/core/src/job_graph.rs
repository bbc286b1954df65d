// SPDX-License-Identifier: MIT

//! The workflow DAG data model: a set of named jobs, each a sequence of
//! steps, with `needs` edges between jobs. Graph-level validation (cycles,
//! dangling `needs`, topological order) lives in `zallet-dag`, which
//! depends on these types; this module only owns field-level shape.

use std::collections::HashMap;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ZalletError;

/// A workflow: an order-preserving map of job name to [`Job`], plus an
/// optional deadline over the whole run. Order is preserved (via
/// `IndexMap`) only for deterministic iteration in tests and logs; the
/// actual execution order is computed by `zallet-dag`'s topological sort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobGraphSpec {
    pub jobs: IndexMap<String, Job>,
    /// Deadline over the entire `Run`, independent of any per-job `timeout`
    /// (supplemental: `original_source/internal/action/model.go`'s
    /// top-level `Timeout` field).
    #[serde(default, with = "crate::probe::duration_fmt::option")]
    pub timeout: Option<Duration>,
}

impl JobGraphSpec {
    /// Field-level checks that don't require looking at the graph as a
    /// whole: non-empty job set, well-formed names, at least one step per
    /// job. Cycle and dangling-`needs` detection is `zallet_dag::validate`.
    pub fn validate_shape(&self) -> Result<(), ZalletError> {
        if self.jobs.is_empty() {
            return Err(ZalletError::Validation("workflow has no jobs".into()));
        }
        for (name, job) in &self.jobs {
            if name.trim().is_empty() || name.chars().any(char::is_whitespace) {
                return Err(ZalletError::Validation(format!(
                    "job name {name:?} must be non-empty and contain no whitespace"
                )));
            }
            if job.steps.is_empty() {
                return Err(ZalletError::Validation(format!(
                    "job {name:?} has no steps"
                )));
            }
            for step in &job.steps {
                if step.name.trim().is_empty() {
                    return Err(ZalletError::Validation(format!(
                        "job {name:?} has a step with an empty name"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Job {
    #[serde(default)]
    pub needs: Vec<String>,
    pub steps: Vec<Step>,
    #[serde(default, with = "crate::probe::duration_fmt::option")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default)]
    pub with: HashMap<String, String>,
    pub script: String,
}

impl Step {
    /// Substitutes `${var}` references in `script` with values from `with`,
    /// leaving unresolved references untouched rather than erroring — a
    /// step author relying on an env var set elsewhere in the chain is not
    /// a validation failure.
    pub fn interpolated_script(&self) -> String {
        let mut out = String::with_capacity(self.script.len());
        let mut rest = self.script.as_str();
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let var = &after[..end];
                    match self.with.get(var) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&rest[start..start + 2 + end + 1]),
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                    break;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_job_set() {
        let spec = JobGraphSpec {
            jobs: IndexMap::new(),
            timeout: None,
        };
        assert!(spec.validate_shape().is_err());
    }

    #[test]
    fn rejects_job_with_no_steps() {
        let mut jobs = IndexMap::new();
        jobs.insert(
            "build".to_string(),
            Job {
                needs: vec![],
                steps: vec![],
                timeout: None,
            },
        );
        let spec = JobGraphSpec { jobs, timeout: None };
        assert!(spec.validate_shape().is_err());
    }

    #[test]
    fn interpolates_known_vars_and_leaves_unknown_untouched() {
        let step = Step {
            name: "s1".into(),
            with: HashMap::from([("greeting".to_string(), "hello".to_string())]),
            script: "echo ${greeting} ${missing}".into(),
        };
        assert_eq!(step.interpolated_script(), "echo hello ${missing}");
    }
}
