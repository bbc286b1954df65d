// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! zallet-executor: runs a validated [`zallet_core::JobGraphSpec`]
//! (spec.md §4.B, §4.C) — dependency-ordered, bounded-concurrency,
//! callback-driven execution of a workflow task's jobs and steps.

mod callbacks;
mod error;
mod executor;

pub use callbacks::{ArtifactCallbacks, ExecutorCallbacks, StepRef};
pub use error::ExecutorError;
pub use executor::{Executor, RunOpts, DEFAULT_MAX_CONCURRENCY, DEFAULT_QUEUE_CAPACITY};
