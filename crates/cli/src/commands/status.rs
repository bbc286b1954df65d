// SPDX-License-Identifier: MIT

//! `zallet status` — daemon-wide uptime and service count (spec.md §6,
//! SPEC_FULL.md §6: "daemon uptime, live service count ... exposed for the
//! CLI's `status` subcommand").

use zallet_wire::{Request, Response};

use crate::client::{self, ok_or_exit};
use crate::exit_error::ExitError;
use crate::output::{print_daemon_status, OutputFormat};

pub async fn run(format: OutputFormat) -> Result<(), ExitError> {
    let response = client::call(&Request::DaemonStatus).await?;
    match ok_or_exit(response)? {
        Response::DaemonStatus { uptime_secs, service_count } => {
            print_daemon_status(uptime_secs, service_count, format);
            Ok(())
        }
        other => Err(ExitError::new(1, format!("unexpected response from daemon: {other:?}"))),
    }
}
