// SPDX-License-Identifier: MIT

//! The daemon's resolved configuration and the shared, `Arc`-wrapped state
//! every request handler (local or remote) operates against.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use zallet_core::{Clock, InstanceId, SystemClock};
use zallet_executor::Executor;
use zallet_storage::{ArtifactStore, Catalog, InProcessCatalog};

/// Resolved on-disk paths and process-wide knobs (spec.md §6 "Persisted
/// layout under baseDir"), collecting `env.rs`'s lookups into one struct at
/// startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_dir: PathBuf,
    pub sock_file: PathBuf,
    pub lock_file: PathBuf,
    pub instance_file: PathBuf,
    pub log_dir: PathBuf,
    pub workflow_root: PathBuf,
    pub supervisor_bin: PathBuf,
    pub reconcile_interval_secs: u64,
    pub remote_addr: Option<String>,
    pub remote_token: Option<String>,
    pub callback_timeout_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self, crate::error::DaemonError> {
        let base_dir = crate::env::base_dir()?;
        Ok(Self {
            sock_file: crate::env::sock_file(&base_dir),
            lock_file: base_dir.join("zallet.pid"),
            instance_file: base_dir.join("instance"),
            log_dir: crate::env::log_dir(&base_dir),
            workflow_root: crate::env::workflow_root(&base_dir),
            supervisor_bin: crate::env::supervisor_bin()?,
            reconcile_interval_secs: crate::env::reconcile_interval_secs(),
            remote_addr: crate::env::remote_addr(),
            remote_token: crate::env::remote_token(),
            callback_timeout_secs: crate::env::callback_timeout_secs(),
            base_dir,
        })
    }
}

/// State shared by every connection handler. Cloned cheaply (everything
/// inside is already `Arc`/`Clone`-friendly) into each spawned task.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub instance_id: InstanceId,
    pub catalog: Arc<dyn Catalog>,
    pub artifacts: ArtifactStore,
    pub executor: Arc<Executor>,
    pub clock: SystemClock,
    pub start_time: Instant,
    pub http: reqwest::Client,
    /// Handles of supervisor processes spawned by this daemon instance,
    /// keyed by serviceId — held so `Kill` can deliver SIGTERM/SIGKILL to
    /// the supervisor's process group directly (spec.md §4.F).
    pub supervisors: Arc<Mutex<HashMap<String, Arc<zallet_process::Handle>>>>,
    /// Cancellation handles for in-flight remote-endpoint work (spec.md
    /// §4.I `killWorkflow`/`kill`), keyed by the caller-supplied taskId.
    /// Workflow taskIds and stage taskIds never collide (disjoint wire
    /// shapes), so one map serves both.
    pub tasks: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl AppState {
    pub fn new(config: Config, instance_id: InstanceId) -> Self {
        let workflow_root = config.workflow_root.clone();
        Self {
            config: Arc::new(config),
            instance_id,
            catalog: Arc::new(InProcessCatalog::new()),
            artifacts: ArtifactStore::new(workflow_root),
            executor: Arc::new(Executor::default()),
            clock: SystemClock,
            start_time: Instant::now(),
            http: reqwest::Client::new(),
            supervisors: Arc::new(Mutex::new(HashMap::new())),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn clock_epoch_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }
}
