// SPDX-License-Identifier: MIT

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::process::Child;
use tokio::task::JoinHandle;

use crate::error::ProcessError;

const KILL_GRACE_PERIOD: Duration = Duration::from_secs(30);
const KILL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A running child process, spawned into its own process group.
///
/// `wait` is idempotent: the first call awaits the child and consumes the
/// tee'd stderr buffer; every subsequent call returns [`ProcessError::Closed`]
/// immediately, matching the "closed" sentinel spec.md §4.A requires instead
/// of tokio's own cached-exit-status behavior.
pub struct Handle {
    pid: Mutex<Option<u32>>,
    child: tokio::sync::Mutex<Option<Child>>,
    stderr_buf: std::sync::Arc<Mutex<Vec<u8>>>,
    stderr_task: Mutex<Option<JoinHandle<()>>>,
    stdout_task: Mutex<Option<JoinHandle<()>>>,
    stdin_task: Mutex<Option<JoinHandle<()>>>,
    temp_script: Option<PathBuf>,
    waited: AtomicBool,
}

impl Handle {
    pub(crate) fn new(
        child: Child,
        pid: Option<u32>,
        stderr_buf: std::sync::Arc<Mutex<Vec<u8>>>,
        stderr_task: Option<JoinHandle<()>>,
        stdout_task: Option<JoinHandle<()>>,
        stdin_task: Option<JoinHandle<()>>,
        temp_script: Option<PathBuf>,
    ) -> Self {
        Self {
            pid: Mutex::new(pid),
            child: tokio::sync::Mutex::new(Some(child)),
            stderr_buf,
            stderr_task: Mutex::new(stderr_task),
            stdout_task: Mutex::new(stdout_task),
            stdin_task: Mutex::new(stdin_task),
            temp_script,
            waited: AtomicBool::new(false),
        }
    }

    /// The child's pid, or `None` once it has been reaped by `wait`.
    pub fn pid(&self) -> Option<u32> {
        *self.pid.lock()
    }

    /// Awaits process exit. Idempotent: a second call returns
    /// [`ProcessError::Closed`] rather than re-running the wait.
    ///
    /// On a non-zero exit, the returned error carries the tee'd stderr text
    /// when the buffer is non-empty, and the raw exit status otherwise. A
    /// zero exit is always `Ok(())`, even if the child wrote to stderr.
    pub async fn wait(&self) -> Result<(), ProcessError> {
        if self.waited.swap(true, Ordering::SeqCst) {
            return Err(ProcessError::Closed);
        }
        let mut guard = self.child.lock().await;
        let child = guard.as_mut().ok_or(ProcessError::Closed)?;
        let status = child.wait().await?;
        *guard = None;
        *self.pid.lock() = None;

        if let Some(task) = self.stderr_task.lock().take() {
            let _ = task.await;
        }
        if let Some(task) = self.stdout_task.lock().take() {
            let _ = task.await;
        }
        if let Some(task) = self.stdin_task.lock().take() {
            let _ = task.await;
        }
        self.cleanup_temp_script().await;

        if status.success() {
            return Ok(());
        }
        let buf = self.stderr_buf.lock().clone();
        if !buf.is_empty() {
            Err(ProcessError::Exited(String::from_utf8_lossy(&buf).into_owned()))
        } else {
            Err(ProcessError::Exited(format!("exit status: {status}")))
        }
    }

    /// Sends SIGTERM to the negative process group id, then escalates to
    /// SIGKILL if the group hasn't exited within 30s.
    pub async fn kill(&self) -> Result<(), ProcessError> {
        let Some(pid) = self.pid() else {
            return Ok(());
        };
        let pgid = Pid::from_raw(-(pid as i32));
        let _ = signal::kill(pgid, Signal::SIGTERM);

        let deadline = tokio::time::Instant::now() + KILL_GRACE_PERIOD;
        loop {
            if !process_alive(pid) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                let _ = signal::kill(pgid, Signal::SIGKILL);
                return Err(ProcessError::KilledAfterTimeout(KILL_GRACE_PERIOD));
            }
            tokio::time::sleep(KILL_POLL_INTERVAL).await;
        }
    }

    async fn cleanup_temp_script(&self) {
        if let Some(path) = &self.temp_script {
            if let Err(err) = tokio::fs::remove_file(path).await {
                tracing::warn!(path = %path.display(), %err, "failed to remove temp script file");
            }
        }
    }
}

fn process_alive(pid: u32) -> bool {
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}
