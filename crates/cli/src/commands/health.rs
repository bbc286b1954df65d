// SPDX-License-Identifier: MIT

//! `zallet health` — check that the daemon is reachable (spec.md §6
//! `GET /health`).

use zallet_wire::{Request, Response};

use crate::client::{self, ok_or_exit};
use crate::exit_error::ExitError;
use crate::output::{print_message, OutputFormat};

pub async fn run(format: OutputFormat) -> Result<(), ExitError> {
    let response = client::call(&Request::Health).await?;
    match ok_or_exit(response)? {
        Response::Ok => {
            print_message("ok", format);
            Ok(())
        }
        other => Err(ExitError::new(1, format!("unexpected response from daemon: {other:?}"))),
    }
}
