// SPDX-License-Identifier: MIT

//! A thin client over the daemon's local command endpoint (spec.md §4.H).
//! Resolves the same on-disk socket path the daemon itself computes
//! (`ZALLET_BASE_DIR` > `XDG_STATE_HOME`/zallet > `~/.local/state/zallet`)
//! and opens one connection per call, mirroring
//! `zallet_supervisor::client::call`.

use std::path::PathBuf;

use tokio::net::UnixStream;

use zallet_wire::{decode, encode, read_message, write_message, Request, Response};

use crate::exit_error::ExitError;

pub fn base_dir() -> Result<PathBuf, ExitError> {
    if let Some(dir) = std::env::var_os("ZALLET_BASE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Some(xdg) = std::env::var_os("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("zallet"));
    }
    dirs::home_dir()
        .map(|home| home.join(".local").join("state").join("zallet"))
        .ok_or_else(|| ExitError::new(1, "could not determine home directory"))
}

pub fn sock_file() -> Result<PathBuf, ExitError> {
    Ok(base_dir()?.join("zallet.sock"))
}

/// Sends one request over a fresh connection to the local socket and
/// returns the decoded response, or an `ExitError` if the daemon can't be
/// reached at all (distinct from the daemon itself replying with
/// `Response::Error`, which callers translate to an exit code themselves).
pub async fn call(request: &Request) -> Result<Response, ExitError> {
    let sock_file = sock_file()?;
    let mut stream = UnixStream::connect(&sock_file)
        .await
        .map_err(|err| ExitError::new(1, format!("failed to connect to {}: {err}", sock_file.display())))?;
    write_message(&mut stream, &encode(request).map_err(|err| ExitError::new(1, err.to_string()))?)
        .await
        .map_err(|err| ExitError::new(1, err.to_string()))?;
    let bytes = read_message(&mut stream).await.map_err(|err| ExitError::new(1, err.to_string()))?;
    decode(&bytes).map_err(|err| ExitError::new(1, err.to_string()))
}

/// Translates a `Response` into `Ok(Response)` or an `ExitError` carrying
/// the daemon's own error message, so command handlers don't each repeat
/// the same match arm.
pub fn ok_or_exit(response: Response) -> Result<Response, ExitError> {
    match response {
        Response::Error { message } => Err(ExitError::new(1, message)),
        other => Ok(other),
    }
}
