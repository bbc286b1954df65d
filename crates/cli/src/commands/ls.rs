// SPDX-License-Identifier: MIT

//! `zallet ls` — list services (spec.md §4.F `Ls`, §6 `GET /ls`).

use clap::Args;

use zallet_core::Status;
use zallet_wire::{Request, Response};

use crate::client::{self, ok_or_exit};
use crate::exit_error::ExitError;
use crate::output::{print_services, OutputFormat};

#[derive(Args)]
pub struct LsArgs {
    /// Only list services with this app token.
    #[arg(long)]
    pub app: Option<String>,

    /// List services across all instances, not just this host's.
    #[arg(long)]
    pub global: bool,

    /// Only list services in this status.
    #[arg(long, value_parser = parse_status)]
    pub status: Option<Status>,
}

pub async fn run(args: LsArgs, format: OutputFormat) -> Result<(), ExitError> {
    let response =
        client::call(&Request::Ls { app: args.app, global: args.global, status: args.status }).await?;
    match ok_or_exit(response)? {
        Response::Services { services } => {
            print_services(&services, format);
            Ok(())
        }
        other => Err(ExitError::new(1, format!("unexpected response from daemon: {other:?}"))),
    }
}

fn parse_status(raw: &str) -> Result<Status, String> {
    match raw {
        "pending" => Ok(Status::Pending),
        "starting" => Ok(Status::Starting),
        "running" => Ok(Status::Running),
        "failed" => Ok(Status::Failed),
        "shutdown" => Ok(Status::Shutdown),
        "killed" => Ok(Status::Killed),
        "restart" => Ok(Status::Restart),
        other => Err(format!(
            "invalid status {other:?}; expected one of: pending, starting, running, failed, shutdown, killed, restart"
        )),
    }
}
