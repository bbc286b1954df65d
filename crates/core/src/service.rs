// SPDX-License-Identifier: MIT

//! The service definition a caller submits via `apply`, and the record the
//! daemon's catalog keeps about a running instance of it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::id::{InstanceId, ServiceId};
use crate::probe::Probe;
use crate::status::Status;
use crate::ZalletError;

/// What to run, submitted by a caller and handed unchanged to the
/// supervisor on every (re)spawn — spec.md §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Environment token (e.g. `dev`, `prod`); non-empty, whitespace-free.
    pub env: String,
    /// App token (e.g. `echo`); non-empty, whitespace-free.
    pub app: String,
    /// Either a single-line command (argv-split) or a multi-line script
    /// (written to a temp file and executed), per `zallet-process`'s
    /// dispatch rule.
    pub start: String,
    /// Appended verbatim to the child's environment as plain `KEY=value`
    /// entries, after the app's own declared environment, later entries
    /// winning on duplicate keys (`original_source/internal/util/util.go`'s
    /// `MergeEnvs`).
    #[serde(default)]
    pub with: HashMap<String, String>,
    #[serde(default)]
    pub probe: Option<Probe>,
    /// Working directory the child process is spawned in; must be an
    /// absolute path if present.
    #[serde(default)]
    pub workdir: Option<String>,
}

impl ServiceSpec {
    pub fn validate(&self) -> Result<(), ZalletError> {
        if self.env.is_empty() || self.env.chars().any(char::is_whitespace) {
            return Err(ZalletError::Validation(format!(
                "service env {:?} must be non-empty and contain no whitespace",
                self.env
            )));
        }
        if self.app.is_empty() || self.app.chars().any(char::is_whitespace) {
            return Err(ZalletError::Validation(format!(
                "service app {:?} must be non-empty and contain no whitespace",
                self.app
            )));
        }
        if self.start.trim().is_empty() {
            return Err(ZalletError::Validation("service start must not be empty".into()));
        }
        if let Some(workdir) = &self.workdir {
            if !workdir.starts_with('/') {
                return Err(ZalletError::Validation(format!(
                    "service workdir {workdir:?} must be an absolute path"
                )));
            }
        }
        if let Some(probe) = &self.probe {
            probe.validate()?;
        }
        Ok(())
    }

    /// The `with` map flattened into `KEY=value` strings, in the order
    /// needed by `zallet-process::spawn`'s `env` parameter.
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        self.with
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

crate::setters!(ServiceSpec {
    into(env: String),
    into(app: String),
    into(start: String),
    set(with: HashMap<String, String>),
    option(probe: Probe),
    option(workdir: String),
});

crate::builder!(
    ServiceSpecBuilder for ServiceSpec {
        into(env: String = "dev".to_string()),
        into(app: String = "svc".to_string()),
        into(start: String = "true".to_string()),
        set(with: HashMap<String, String> = HashMap::new()),
        option(probe: Probe),
        option(workdir: String),
    }
    build(self) -> ServiceSpec {
        ServiceSpec {
            env: self.env,
            app: self.app,
            start: self.start,
            with: self.with,
            probe: self.probe,
            workdir: self.workdir,
        }
    }
);

/// The daemon's cached view of a service: the spec it was applied with,
/// plus everything reported back by the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: ServiceId,
    pub spec: ServiceSpec,
    pub status: Status,
    /// The host-level daemon identity that created this row (spec.md §3's
    /// `instanceId`, glossary: "a host-level controller identity; persisted
    /// to survive restarts"), stamped once at `apply` time and never
    /// changed afterwards. `ls`/`kill` scope to this unless `global` is set.
    pub instance_id: Option<InstanceId>,
    /// Pid of the supervisor process itself (spec.md §3: "pid (supervisor
    /// pid)"), not the user command it supervises.
    pub pid: Option<u32>,
    /// Opaque handle the daemon uses to address the supervisor process that
    /// owns this service, plumbed through without interpretation.
    pub agent_host: Option<String>,
    pub agent_token: Option<String>,
    pub err_log: Option<String>,
    pub probe_fail_count: u32,
    pub probe_timestamp_ms: Option<u64>,
    pub cpu_percent: Option<f64>,
    pub mem_percent: Option<f64>,
    /// Incremented on every state-changing update; callers performing a
    /// read-modify-write must supply the revision they last observed.
    pub revision: u64,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl ServiceRecord {
    /// A record whose supervisor pid is confirmed dead and whose status
    /// isn't already `killed` is eligible for the reconciliation loop to
    /// delete it (spec.md §3 invariant).
    pub fn is_reconciliation_candidate(&self, pid_alive: bool) -> bool {
        !pid_alive && self.status != Status::Killed
    }
}

crate::setters!(ServiceRecord {
    set(status: Status),
    option(instance_id: InstanceId),
    option(pid: u32),
    option(agent_host: String),
    option(agent_token: String),
    option(err_log: String),
    set(probe_fail_count: u32),
    option(probe_timestamp_ms: u64),
    option(cpu_percent: f64),
    option(mem_percent: f64),
    set(revision: u64),
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_whitespace_in_env() {
        let spec = ServiceSpec::test_builder().env("bad env").build();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn rejects_whitespace_in_app() {
        let spec = ServiceSpec::test_builder().app("bad app").build();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn rejects_empty_start() {
        let spec = ServiceSpec::test_builder().start("").build();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn rejects_relative_workdir() {
        let spec = ServiceSpec::test_builder().workdir("relative/path".to_string()).build();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn accepts_minimal_spec() {
        let spec = ServiceSpec::test_builder().build();
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn reconciliation_candidate_requires_dead_pid_and_not_killed() {
        let mut record = ServiceRecord {
            id: ServiceId::generate_at(0, "20260101000000"),
            spec: ServiceSpec::test_builder().build(),
            status: Status::Running,
            instance_id: None,
            pid: Some(1),
            agent_host: None,
            agent_token: None,
            err_log: None,
            probe_fail_count: 0,
            probe_timestamp_ms: None,
            cpu_percent: None,
            mem_percent: None,
            revision: 1,
            created_at_ms: 0,
            updated_at_ms: 0,
        };
        assert!(record.is_reconciliation_candidate(false));
        assert!(!record.is_reconciliation_candidate(true));
        record.status = Status::Killed;
        assert!(!record.is_reconciliation_candidate(false));
    }
}
