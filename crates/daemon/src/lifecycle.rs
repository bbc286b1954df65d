// SPDX-License-Identifier: MIT

//! Daemon startup and shutdown: directories and the lock file are created
//! first, the socket is bound last, only once everything else has
//! succeeded (spec.md §4.H, §4.F's `instance` file note).

use std::io::Write;

use fs2::FileExt;
use tokio::net::UnixListener;
use tracing::{info, warn};

use zallet_core::InstanceId;

use crate::error::DaemonError;
use crate::state::{AppState, Config};

pub struct StartupResult {
    pub state: AppState,
    pub listener: UnixListener,
    pub lock_file: std::fs::File,
}

pub async fn startup(config: Config) -> Result<StartupResult, DaemonError> {
    match startup_inner(config.clone()).await {
        Ok(result) => Ok(result),
        Err(err) => {
            if !matches!(err, DaemonError::LockHeld(_)) {
                cleanup_on_failure(&config);
            }
            Err(err)
        }
    }
}

async fn startup_inner(config: Config) -> Result<StartupResult, DaemonError> {
    std::fs::create_dir_all(&config.base_dir)?;
    std::fs::create_dir_all(&config.log_dir)?;
    std::fs::create_dir_all(&config.workflow_root)?;

    // Lock file acquired before anything else touches the base dir, so a
    // second `zalletd` started against the same base dir fails fast instead
    // of racing this one for the socket.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_file)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| DaemonError::LockHeld(config.lock_file.clone()))?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    let instance_id = load_or_regenerate_instance_id(&config)?;

    if config.sock_file.exists() {
        std::fs::remove_file(&config.sock_file)?;
    }
    let listener = UnixListener::bind(&config.sock_file)
        .map_err(|e| DaemonError::Bind(config.sock_file.clone(), e))?;

    info!(instance_id = %instance_id, sock_file = %config.sock_file.display(), "daemon started");

    Ok(StartupResult { state: AppState::new(config, instance_id), listener, lock_file })
}

/// The `instance` file is regenerated whenever it is unreadable or not
/// exactly 32 bytes (spec.md §4.F supplemental), rather than failing
/// startup outright.
fn load_or_regenerate_instance_id(config: &Config) -> Result<InstanceId, DaemonError> {
    let existing = std::fs::read_to_string(&config.instance_file)
        .ok()
        .and_then(|raw| InstanceId::from_string(raw.trim()).ok());
    if let Some(id) = existing {
        return Ok(id);
    }
    let id = InstanceId::generate();
    std::fs::write(&config.instance_file, id.as_str())?;
    warn!(instance_id = %id, "regenerated instance id");
    Ok(id)
}

fn cleanup_on_failure(config: &Config) {
    if config.sock_file.exists() {
        let _ = std::fs::remove_file(&config.sock_file);
    }
    if config.lock_file.exists() {
        let _ = std::fs::remove_file(&config.lock_file);
    }
}

/// Removes the socket and lock file so a fresh `startup` can run cleanly.
/// The lock is released implicitly when `lock_file` is dropped (closing the
/// fd), so callers pass it in to make that explicit at the call site.
pub fn shutdown(state: &AppState, lock_file: std::fs::File) {
    drop(lock_file);
    let _ = std::fs::remove_file(&state.config.sock_file);
    let _ = std::fs::remove_file(&state.config.lock_file);
    info!("daemon shut down");
}
