// SPDX-License-Identifier: MIT

//! `zallet restart` — delete and reapply a service's stored spec (spec.md
//! §4.F `Restart`).

use clap::Args;

use zallet_wire::{Request, Response};

use crate::client::{self, ok_or_exit};
use crate::exit_error::ExitError;
use crate::output::{print_message, OutputFormat};

#[derive(Args)]
pub struct RestartArgs {
    pub service_id: String,
}

pub async fn run(args: RestartArgs, format: OutputFormat) -> Result<(), ExitError> {
    let response = client::call(&Request::Restart { service_id: args.service_id }).await?;
    match ok_or_exit(response)? {
        Response::Text { message } => {
            print_message(&format!("service {message} restarted"), format);
            Ok(())
        }
        other => Err(ExitError::new(1, format!("unexpected response from daemon: {other:?}"))),
    }
}
