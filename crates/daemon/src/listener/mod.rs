// SPDX-License-Identifier: MIT

//! The two wire-compatible request listeners the daemon serves: the
//! unauthenticated local Unix socket (spec.md §4.H) and the
//! token-authenticated remote TCP endpoint (spec.md §4.I). Both frame
//! messages the same way (`zallet_wire::wire`); only the accepted
//! transport and the set of operations served differ.

pub mod local;
pub mod remote;
