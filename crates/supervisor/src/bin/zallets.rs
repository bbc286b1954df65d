// SPDX-License-Identifier: MIT

//! `zallets`: the per-service supervisor binary (spec.md §4.E, §7). The
//! daemon re-execs this binary with no arguments and pipes a
//! [`zallet_supervisor::SupervisorOpts`] JSON document to its stdin; this
//! process owns exactly one child for as long as it lives.

use std::io::Read;
use std::process::ExitCode;

use zallet_supervisor::SupervisorOpts;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("ZALLET_LOG"))
        .init();

    let mut input = String::new();
    if let Err(err) = std::io::stdin().read_to_string(&mut input) {
        eprintln!("zallets: failed to read opts from stdin: {err}");
        return ExitCode::FAILURE;
    }

    let opts: SupervisorOpts = match serde_json::from_str(&input) {
        Ok(opts) => opts,
        Err(err) => {
            eprintln!("zallets: malformed opts: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = opts.validate() {
        eprintln!("zallets: invalid opts: {err}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("zallets: failed to start tokio runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(zallet_supervisor::run(opts)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("zallets: {err}");
            ExitCode::FAILURE
        }
    }
}
