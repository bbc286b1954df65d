// SPDX-License-Identifier: MIT

//! `zallet`: a thin client over the daemon's local command endpoint
//! (spec.md §4.H, §6). Every subcommand opens one connection, sends one
//! framed request, and prints the response; `main` is the only place that
//! turns a command's `Result` into a process exit code.

mod client;
mod commands;
mod exit_error;
mod output;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use exit_error::ExitError;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "zallet", version, about = "Service supervisor and workflow executor CLI")]
struct Cli {
    /// Output format for commands that print structured data.
    #[arg(long, short = 'o', global = true, default_value = "text")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a service spec.
    Apply(commands::apply::ApplyArgs),
    /// List services.
    Ls(commands::ls::LsArgs),
    /// Stop a running service.
    Kill(commands::kill::KillArgs),
    /// Remove a service's catalog row.
    Delete(commands::delete::DeleteArgs),
    /// Delete and reapply a service's stored spec.
    Restart(commands::restart::RestartArgs),
    /// Check that the daemon is reachable.
    Health,
    /// Show daemon uptime and service count.
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("zallet: failed to start tokio runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("zallet: {err}");
            ExitCode::from(err.code as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<(), ExitError> {
    match cli.command {
        Command::Apply(args) => commands::apply::run(args, cli.output).await,
        Command::Ls(args) => commands::ls::run(args, cli.output).await,
        Command::Kill(args) => commands::kill::run(args, cli.output).await,
        Command::Delete(args) => commands::delete::run(args, cli.output).await,
        Command::Restart(args) => commands::restart::run(args, cli.output).await,
        Command::Health => commands::health::run(cli.output).await,
        Command::Status => commands::status::run(cli.output).await,
    }
}
