// SPDX-License-Identifier: MIT

//! The four callbacks `Run` drives a caller through (spec.md §4.C), plus a
//! ready-made implementation that wires them straight into the artifact
//! store (spec.md §4.D) — the shape the daemon's workflow handler actually
//! uses, grounded in how the two components are described as cooperating
//! rather than independent.

use std::pin::Pin;
use std::time::Duration;

use tokio::io::AsyncWrite;

use zallet_core::{Clock, RunStatus, TaskId};
use zallet_storage::ArtifactStore;

use crate::error::ExecutorError;

/// Identifies one step within a running task, passed to every per-step
/// callback.
#[derive(Debug, Clone, Copy)]
pub struct StepRef<'a> {
    pub job_name: &'a str,
    pub step_index: usize,
}

/// Callbacks a caller of [`crate::Executor::run`] supplies to observe and
/// persist a task's progress. All methods have a no-op default except
/// [`ExecutorCallbacks::step_output_sink`], which every implementation must
/// provide a real destination for (spec.md §4.C: "a pipe carries the
/// child's combined stdout/stderr to the `StepOutput` callback").
pub trait ExecutorCallbacks: Send + Sync {
    fn job_before(&self, _job_name: &str) {}

    fn job_after(&self, _job_name: &str, _err: Option<&ExecutorError>, _duration: Duration) {}

    /// A writable sink the executor copies a step's combined stdout/stderr
    /// into as it runs.
    fn step_output_sink(
        &self,
        step: StepRef<'_>,
    ) -> Pin<Box<dyn AsyncWrite + Send + Unpin>>;

    fn step_after(
        &self,
        _step: StepRef<'_>,
        _err: Option<&ExecutorError>,
        _begin_epoch_ms: u64,
        _duration: Duration,
    ) {
    }
}

/// Persists every callback straight to [`ArtifactStore`]'s fixed directory
/// layout (spec.md §3 `TaskArtifact`, §4.D): job/step `status`, `begin`,
/// `error.log`, and the step's append-only `log`.
pub struct ArtifactCallbacks<C: Clock> {
    store: ArtifactStore,
    task_id: TaskId,
    clock: C,
}

impl<C: Clock> ArtifactCallbacks<C> {
    pub fn new(store: ArtifactStore, task_id: TaskId, clock: C) -> Self {
        Self { store, task_id, clock }
    }

    fn job_dir(&self, job_name: &str) -> std::path::PathBuf {
        self.store.job_dir(&self.task_id, job_name)
    }

    fn step_dir(&self, step: StepRef<'_>) -> std::path::PathBuf {
        self.store.step_dir(&self.task_id, step.job_name, step.step_index)
    }
}

impl<C: Clock> ExecutorCallbacks for ArtifactCallbacks<C> {
    fn job_before(&self, job_name: &str) {
        let dir = self.job_dir(job_name);
        let store = self.store.clone();
        let epoch_ms = self.clock.epoch_ms();
        tokio::spawn(async move {
            if let Err(err) = store.ensure_dir(&dir).await {
                tracing::warn!(%err, "failed to create job artifact dir");
                return;
            }
            let _ = store.write_begin(&dir, epoch_ms).await;
        });
    }

    fn job_after(&self, job_name: &str, err: Option<&ExecutorError>, duration: Duration) {
        let dir = self.job_dir(job_name);
        let store = self.store.clone();
        let status = run_status_for(err);
        let duration_millis = duration.as_millis() as u64;
        let err_text = err.map(|e| e.to_string());
        tokio::spawn(async move {
            let _ = store.write_status(&dir, status, duration_millis).await;
            if let Some(text) = err_text {
                let _ = store.write_error_log(&dir, &text).await;
            }
        });
    }

    fn step_output_sink(&self, step: StepRef<'_>) -> Pin<Box<dyn AsyncWrite + Send + Unpin>> {
        let dir = self.step_dir(step);
        let store = self.store.clone();
        // `open_log_appender` is async; the executor needs a sink
        // synchronously when it spawns the child, so this adapter lazily
        // opens the file on first write rather than blocking here.
        Box::pin(LazyLogAppender::new(store, dir))
    }

    fn step_after(
        &self,
        step: StepRef<'_>,
        err: Option<&ExecutorError>,
        begin_epoch_ms: u64,
        duration: Duration,
    ) {
        let dir = self.step_dir(step);
        let store = self.store.clone();
        let status = run_status_for(err);
        let duration_millis = duration.as_millis() as u64;
        let err_text = err.map(|e| e.to_string());
        tokio::spawn(async move {
            let _ = store.ensure_dir(&dir).await;
            let _ = store.write_begin(&dir, begin_epoch_ms).await;
            let _ = store.write_status(&dir, status, duration_millis).await;
            if let Some(text) = err_text {
                let _ = store.write_error_log(&dir, &text).await;
            }
        });
    }
}

fn run_status_for(err: Option<&ExecutorError>) -> RunStatus {
    match err {
        None => RunStatus::Success,
        Some(ExecutorError::Cancelled) => RunStatus::Cancelled,
        Some(ExecutorError::DeadlineExceeded(_)) => RunStatus::Timeout,
        Some(_) => RunStatus::Fail,
    }
}

/// Opens the artifact store's step `log` file on first poll and buffers
/// writes through it, so constructing the sink (on the executor's hot
/// path, before the child is even spawned) never blocks on filesystem I/O.
struct LazyLogAppender {
    store: ArtifactStore,
    dir: std::path::PathBuf,
    state: LazyLogState,
}

enum LazyLogState {
    Pending,
    Opening(Pin<Box<dyn std::future::Future<Output = std::io::Result<tokio::fs::File>> + Send>>),
    Open(tokio::fs::File),
    Failed,
}

impl LazyLogAppender {
    fn new(store: ArtifactStore, dir: std::path::PathBuf) -> Self {
        Self { store, dir, state: LazyLogState::Pending }
    }
}

impl AsyncWrite for LazyLogAppender {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        use std::task::Poll;
        loop {
            match &mut self.state {
                LazyLogState::Pending => {
                    let store = self.store.clone();
                    let dir = self.dir.clone();
                    let fut = Box::pin(async move {
                        store.ensure_dir(&dir).await.map_err(std::io::Error::other)?;
                        store.open_log_appender(&dir).await.map_err(std::io::Error::other)
                    });
                    self.state = LazyLogState::Opening(fut);
                }
                LazyLogState::Opening(fut) => match fut.as_mut().poll(cx) {
                    Poll::Ready(Ok(file)) => self.state = LazyLogState::Open(file),
                    Poll::Ready(Err(err)) => {
                        self.state = LazyLogState::Failed;
                        return Poll::Ready(Err(err));
                    }
                    Poll::Pending => return Poll::Pending,
                },
                LazyLogState::Open(file) => {
                    return Pin::new(file).poll_write(cx, buf);
                }
                LazyLogState::Failed => {
                    return Poll::Ready(Err(std::io::Error::other("log appender failed to open")));
                }
            }
        }
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match &mut self.state {
            LazyLogState::Open(file) => Pin::new(file).poll_flush(cx),
            _ => std::task::Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match &mut self.state {
            LazyLogState::Open(file) => Pin::new(file).poll_shutdown(cx),
            _ => std::task::Poll::Ready(Ok(())),
        }
    }
}
