// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Duration;

use zallet_core::ZalletError;

/// Errors surfaced by a job or step run. Cheaply cloneable (`Arc`-wrapped
/// message) so the same cause can be handed to a dependency's watchers, the
/// job's own `JobAfter` callback, and the task-level aggregate error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutorError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("step failed: {0}")]
    StepFailed(String),

    #[error("deadline-exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("out of capacity: {0}")]
    OutOfCapacity(String),

    #[error("upstream job failed: {0}")]
    UpstreamFailed(String),

    #[error("io: {0}")]
    Io(Arc<str>),
}

impl From<ExecutorError> for ZalletError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Validation(m) => ZalletError::Validation(m),
            ExecutorError::StepFailed(m) => ZalletError::TransientExec(m),
            ExecutorError::DeadlineExceeded(d) => ZalletError::Timeout(d),
            ExecutorError::Cancelled => ZalletError::Cancelled,
            ExecutorError::OutOfCapacity(m) => ZalletError::OutOfCapacity(m),
            ExecutorError::UpstreamFailed(m) => ZalletError::TransientExec(m),
            ExecutorError::Io(m) => ZalletError::Io(std::io::Error::other(m.to_string())),
        }
    }
}

impl From<zallet_dag::DagError> for ExecutorError {
    fn from(err: zallet_dag::DagError) -> Self {
        ExecutorError::Validation(err.to_string())
    }
}

impl From<zallet_process::ProcessError> for ExecutorError {
    fn from(err: zallet_process::ProcessError) -> Self {
        ExecutorError::StepFailed(err.to_string())
    }
}

impl From<zallet_storage::StorageError> for ExecutorError {
    fn from(err: zallet_storage::StorageError) -> Self {
        ExecutorError::Io(err.to_string().into())
    }
}

impl From<std::io::Error> for ExecutorError {
    fn from(err: std::io::Error) -> Self {
        ExecutorError::Io(err.to_string().into())
    }
}
