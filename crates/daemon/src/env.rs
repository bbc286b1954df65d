// SPDX-License-Identifier: MIT

//! Resolves the daemon's on-disk layout from the environment:
//! `ZALLET_BASE_DIR` overrides everything, else `$XDG_STATE_HOME/zallet`,
//! else `~/.local/state/zallet`.

use std::path::PathBuf;

use crate::error::DaemonError;

pub fn base_dir() -> Result<PathBuf, DaemonError> {
    if let Some(dir) = std::env::var_os("ZALLET_BASE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Some(xdg) = std::env::var_os("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("zallet"));
    }
    dirs::home_dir()
        .map(|home| home.join(".local").join("state").join("zallet"))
        .ok_or(DaemonError::NoBaseDir)
}

/// Heartbeat/stats/reconciliation cadences are fixed by spec.md §4.E/§4.F;
/// these are the only knobs the original leaves to the environment.
pub fn reconcile_interval_secs() -> u64 {
    std::env::var("ZALLET_RECONCILE_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10)
}

/// Local socket path the CLI and supervisors connect to.
pub fn sock_file(base_dir: &std::path::Path) -> PathBuf {
    base_dir.join("zallet.sock")
}

/// Where `apply` redirects a supervisor's own stdout (spec.md §6 persisted
/// layout: `<app>/log/<serviceId>.log`, date-partitioned here per §4.F).
pub fn log_dir(base_dir: &std::path::Path) -> PathBuf {
    base_dir.join("log")
}

/// Root of the workflow artifact tree (spec.md §6: `workflow/action/...`).
pub fn workflow_root(base_dir: &std::path::Path) -> PathBuf {
    base_dir.join("workflow").join("action")
}

/// The `zallets` binary the daemon re-execs per service (spec.md §4.F,
/// §7). Defaults to a binary named `zallets` alongside the daemon's own
/// executable; `ZALLET_SUPERVISOR_BIN` overrides it for tests and
/// non-standard installs.
pub fn supervisor_bin() -> Result<PathBuf, DaemonError> {
    if let Some(path) = std::env::var_os("ZALLET_SUPERVISOR_BIN") {
        return Ok(PathBuf::from(path));
    }
    let exe = std::env::current_exe().map_err(DaemonError::Io)?;
    let dir = exe.parent().ok_or(DaemonError::NoBaseDir)?;
    Ok(dir.join("zallets"))
}

/// Remote endpoint (spec.md §4.I) is opt-in: no `ZALLET_REMOTE_ADDR` means
/// the daemon only serves the local socket.
pub fn remote_addr() -> Option<String> {
    std::env::var("ZALLET_REMOTE_ADDR").ok()
}

pub fn remote_token() -> Option<String> {
    std::env::var("ZALLET_REMOTE_TOKEN").ok()
}

pub fn callback_timeout_secs() -> u64 {
    std::env::var("ZALLET_CALLBACK_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10)
}
