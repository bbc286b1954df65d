// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! zallet-dag: job graph validation and deterministic topological ordering
//! for the workflow DAG, spec.md §4.B.

mod error;
mod topo;
mod validate;

pub use error::DagError;
pub use topo::topo_order;
pub use validate::validate;
