// SPDX-License-Identifier: MIT

//! The error taxonomy shared by every crate in the workspace. Each variant
//! corresponds to one of the nine outcome kinds a caller needs to branch
//! on: is this retryable, is it the caller's fault, should it surface to
//! the user verbatim.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ZalletError {
    /// The request itself is malformed: bad spec, unknown id, bad argument.
    #[error("validation: {0}")]
    Validation(String),

    /// A step or process run failed but may succeed on retry (nonzero exit,
    /// probe failure below the configured threshold).
    #[error("transient failure: {0}")]
    TransientExec(String),

    /// A deadline elapsed before the operation completed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The operation was cancelled by the caller (job kill, shutdown).
    #[error("cancelled")]
    Cancelled,

    /// The executor's worker pool or queue is full.
    #[error("out of capacity: {0}")]
    OutOfCapacity(String),

    /// The referenced id does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation conflicts with the current state (stale revision,
    /// already-running job with the same id).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Local filesystem or process I/O failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// A network call (probe, remote endpoint, callback) failed.
    #[error("network: {0}")]
    Network(String),
}

impl ZalletError {
    /// Whether a caller driving a retry loop (probe failures, step retries)
    /// should treat this as retryable rather than terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ZalletError::TransientExec(_) | ZalletError::Timeout(_) | ZalletError::Network(_)
        )
    }
}

#[cfg(feature = "test-support")]
impl PartialEq for ZalletError {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
