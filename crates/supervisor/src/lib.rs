// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! zallet-supervisor: owns exactly one user-service child process (spec.md
//! §4.E). Spawned by the daemon as `<bin> service`, reading a
//! [`SupervisorOpts`] JSON document from stdin, and reporting status,
//! probe, and resource-usage updates back over the daemon's local command
//! endpoint (spec.md §4.H) until the child exits or a shutdown fires.

mod client;
mod error;
mod lifecycle;
mod opts;
mod probe_check;
mod stats;

pub use error::SupervisorError;
pub use lifecycle::run;
pub use opts::SupervisorOpts;
pub use stats::StatsSampler;
