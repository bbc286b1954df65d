// SPDX-License-Identifier: MIT

//! The supervised-service lifecycle states.

use crate::simple_display;

/// Lifecycle state of a supervised service, as tracked by both the
/// supervisor (authoritative, in-process) and the daemon's catalog (a
/// cached copy updated by `reportStatus`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Accepted by the daemon, supervisor process not yet confirmed alive.
    Pending,
    /// Supervisor is alive and spawning or respawning the child process.
    Starting,
    /// Child process is alive and, if a probe is configured, passing it.
    Running,
    /// Child exited non-zero, or the probe failed past its threshold, and
    /// no restart is in flight.
    Failed,
    /// The supervisor is tearing the child down in response to a kill or
    /// delete request.
    Shutdown,
    /// The supervisor itself was killed or died without a clean shutdown.
    Killed,
    /// Transient marker: a restart has been triggered and is in progress.
    Restart,
}

simple_display!(Status {
    Pending => "pending",
    Starting => "starting",
    Running => "running",
    Failed => "failed",
    Shutdown => "shutdown",
    Killed => "killed",
    Restart => "restart",
});

impl Status {
    /// Whether the service is in a state from which the daemon's
    /// reconciliation loop should consider it eligible for cleanup once the
    /// backing process is confirmed dead.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Failed | Status::Shutdown | Status::Killed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        pending = { Status::Pending, "pending" },
        starting = { Status::Starting, "starting" },
        running = { Status::Running, "running" },
        failed = { Status::Failed, "failed" },
        shutdown = { Status::Shutdown, "shutdown" },
        killed = { Status::Killed, "killed" },
        restart = { Status::Restart, "restart" },
    )]
    fn displays_as_expected(status: Status, expected: &str) {
        assert_eq!(status.to_string(), expected);
    }

    #[test]
    fn only_failed_shutdown_killed_are_terminal() {
        assert!(Status::Failed.is_terminal());
        assert!(Status::Shutdown.is_terminal());
        assert!(Status::Killed.is_terminal());
        assert!(!Status::Running.is_terminal());
        assert!(!Status::Pending.is_terminal());
        assert!(!Status::Starting.is_terminal());
        assert!(!Status::Restart.is_terminal());
    }
}
