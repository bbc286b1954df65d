// SPDX-License-Identifier: MIT

use zallet_core::ZalletError;

/// Errors surfaced by the daemon's own startup, lifecycle, and listener
/// plumbing. Per-request failures are translated into `Response::Error`
/// instead of propagating here (spec.md §7: "any controller-observed
/// invariant violation returns a user-visible 500 with the message").
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("could not determine a base directory (set ZALLET_BASE_DIR or $HOME)")]
    NoBaseDir,

    #[error("failed to acquire lock at {0}: a daemon is already running")]
    LockHeld(std::path::PathBuf),

    #[error("failed to bind local socket at {0}: {1}")]
    Bind(std::path::PathBuf, std::io::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage: {0}")]
    Storage(#[from] zallet_storage::StorageError),

    #[error("wire: {0}")]
    Wire(#[from] zallet_wire::ProtocolError),
}

impl From<DaemonError> for ZalletError {
    fn from(err: DaemonError) -> Self {
        match err {
            DaemonError::NoBaseDir => ZalletError::Validation(err.to_string()),
            DaemonError::LockHeld(_) => ZalletError::Conflict(err.to_string()),
            DaemonError::Bind(_, _) => ZalletError::Io(std::io::Error::other(err.to_string())),
            DaemonError::Io(e) => ZalletError::Io(e),
            DaemonError::Storage(e) => e.into(),
            DaemonError::Wire(e) => ZalletError::Network(e.to_string()),
        }
    }
}
