// SPDX-License-Identifier: MIT

use std::time::Duration;

/// Errors surfaced by [`crate::spawn`] and [`crate::Handle`].
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// `exec` itself failed: command not found, permission denied, bad
    /// workdir. Always returned synchronously from `spawn`, never from
    /// `wait`.
    #[error("spawn failed: {0}")]
    Spawn(String),

    /// The child exited with a non-zero status. The message is the tee'd
    /// stderr buffer when non-empty, otherwise the raw exit status.
    #[error("{0}")]
    Exited(String),

    /// `wait` was called more than once on the same handle.
    #[error("process is closed")]
    Closed,

    /// `kill` did not observe the process group exit within the grace
    /// period and had to escalate to SIGKILL.
    #[error("killed after {0:?} grace period")]
    KilledAfterTimeout(Duration),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProcessError> for zallet_core::ZalletError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Spawn(msg) => zallet_core::ZalletError::TransientExec(msg),
            ProcessError::Exited(msg) => zallet_core::ZalletError::TransientExec(msg),
            ProcessError::Closed => {
                zallet_core::ZalletError::Conflict("process already closed".into())
            }
            ProcessError::KilledAfterTimeout(d) => zallet_core::ZalletError::Timeout(d),
            ProcessError::Io(e) => zallet_core::ZalletError::Io(e),
        }
    }
}
