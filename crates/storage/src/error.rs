// SPDX-License-Identifier: MIT

use zallet_core::ZalletError;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<StorageError> for ZalletError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => ZalletError::Io(e),
            StorageError::NotFound(msg) => ZalletError::NotFound(msg),
            StorageError::Conflict(msg) => ZalletError::Conflict(msg),
        }
    }
}
