// SPDX-License-Identifier: MIT

//! A thin client over the daemon's local command endpoint (spec.md §4.H),
//! used by the supervisor's three background loops to report status,
//! probe results, and resource stats back to the controller.

use tokio::net::UnixStream;

use zallet_wire::{read_message, write_message, encode, decode, Request, Response};

use crate::error::SupervisorError;

/// Opens a fresh connection, sends one request, and reads back the
/// response. Reconnecting per call (rather than holding one long-lived
/// connection) keeps the supervisor's reporting loops resilient to a
/// daemon restart between heartbeats.
pub async fn call(sock_file: &std::path::Path, request: &Request) -> Result<Response, SupervisorError> {
    let mut stream = UnixStream::connect(sock_file).await?;
    write_message(&mut stream, &encode(request)?).await?;
    let response: Response = decode(&read_message(&mut stream).await?)?;
    Ok(response)
}
