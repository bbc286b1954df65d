// SPDX-License-Identifier: MIT

//! `zallet delete` — remove a service's catalog row and kill its
//! supervisor (spec.md §4.F `Delete`).

use clap::Args;

use zallet_wire::{Request, Response};

use crate::client::{self, ok_or_exit};
use crate::exit_error::ExitError;
use crate::output::{print_message, OutputFormat};

#[derive(Args)]
pub struct DeleteArgs {
    pub service_id: String,
}

pub async fn run(args: DeleteArgs, format: OutputFormat) -> Result<(), ExitError> {
    let response = client::call(&Request::Delete { service_id: args.service_id }).await?;
    match ok_or_exit(response)? {
        Response::Ok => {
            print_message("ok", format);
            Ok(())
        }
        other => Err(ExitError::new(1, format!("unexpected response from daemon: {other:?}"))),
    }
}
