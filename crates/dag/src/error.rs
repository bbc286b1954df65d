// SPDX-License-Identifier: MIT

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DagError {
    #[error("empty jobs")]
    EmptyJobs,

    #[error("invalid jobName: {0}")]
    InvalidJobName(String),

    #[error("job needs point to itself: {0}")]
    SelfNeed(String),

    #[error("job node does not exist: {0}")]
    DanglingNeed(String),

    #[error("job has no steps: {0}")]
    NoSteps(String),

    #[error("round job: {0}")]
    Cycle(String),
}

impl From<DagError> for zallet_core::ZalletError {
    fn from(err: DagError) -> Self {
        zallet_core::ZalletError::Validation(err.to_string())
    }
}
