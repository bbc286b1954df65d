// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! zallet-wire: the framed request/response protocol shared by the local
//! command endpoint (spec.md §4.H) and the remote command endpoint (spec.md
//! §4.I) — a 4-byte big-endian length prefix around a JSON payload, and the
//! tagged `Request`/`Response` enums carried inside it.

mod types;
mod wire;

pub use types::{
    ContentType, JobStatusEntry, ReportDaemonReq, ReportProbeReq, ReportStatReq, ReportStatusReq,
    Request, Response, ServiceSummary, StepStatusEntry, WorkflowTaskStatus,
};
pub use wire::{decode, encode, read_message, read_request, write_message, write_response, ProtocolError};
