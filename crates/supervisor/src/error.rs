// SPDX-License-Identifier: MIT

use zallet_core::ZalletError;

/// Errors surfaced by the supervisor's own startup and control-channel
/// plumbing. Probe/heartbeat/stats failures during the run loop are logged
/// and swallowed (spec.md §4.E) rather than represented here.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("invalid supervisor opts: {0}")]
    InvalidOpts(String),

    #[error("spawn failed: {0}")]
    Spawn(#[from] zallet_process::ProcessError),

    /// The supervised child exited non-zero.
    #[error("child failed: {0}")]
    ChildFailed(String),

    #[error("control channel: {0}")]
    Control(#[from] zallet_wire::ProtocolError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SupervisorError> for ZalletError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::InvalidOpts(msg) => ZalletError::Validation(msg),
            SupervisorError::Spawn(e) => e.into(),
            SupervisorError::ChildFailed(msg) => ZalletError::TransientExec(msg),
            SupervisorError::Control(e) => ZalletError::Network(e.to_string()),
            SupervisorError::Io(e) => ZalletError::Io(e),
        }
    }
}
