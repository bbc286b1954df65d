// SPDX-License-Identifier: MIT

//! `zalletd`: the host-level controller/daemon binary (spec.md §4.F).
//! Binds the local command endpoint (§4.H), optionally the remote endpoint
//! (§4.I), and runs the reconciliation loop (§4.F) until a termination
//! signal arrives, then tears everything down cleanly.

use std::process::ExitCode;

use tokio_util::sync::CancellationToken;

use zallet_daemon::state::Config;
use zallet_daemon::{lifecycle, listener, reconcile, AppState, DaemonError};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("ZALLET_LOG"))
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("zalletd: failed to start tokio runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("zalletd: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), DaemonError> {
    tracing::info!(git_hash = env!("BUILD_GIT_HASH"), "zalletd starting");

    let config = Config::load()?;
    let startup = lifecycle::startup(config).await?;
    let shutdown = CancellationToken::new();

    let reconcile_task =
        tokio::spawn(reconcile::run(startup.state.clone(), shutdown.child_token()));
    let local_task = tokio::spawn(listener::local::serve(
        startup.state.clone(),
        startup.listener,
        shutdown.child_token(),
    ));
    let remote_task = match bind_remote(&startup.state).await? {
        Some(remote_listener) => Some(tokio::spawn(listener::remote::serve(
            startup.state.clone(),
            remote_listener,
            shutdown.child_token(),
        ))),
        None => None,
    };

    wait_for_termination_signal().await;
    tracing::info!("shutdown signal received, draining listeners");
    shutdown.cancel();

    let _ = local_task.await;
    let _ = reconcile_task.await;
    if let Some(task) = remote_task {
        let _ = task.await;
    }

    lifecycle::shutdown(&startup.state, startup.lock_file);
    Ok(())
}

/// The remote endpoint (spec.md §4.I) is opt-in: a daemon started without
/// `ZALLET_REMOTE_ADDR` only serves the local socket.
async fn bind_remote(state: &AppState) -> Result<Option<tokio::net::TcpListener>, DaemonError> {
    let Some(addr) = &state.config.remote_addr else {
        return Ok(None);
    };
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(DaemonError::Io)?;
    tracing::info!(%addr, "remote endpoint listening");
    Ok(Some(listener))
}

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let term = signal(SignalKind::terminate());
    let interrupt = signal(SignalKind::interrupt());
    match (term, interrupt) {
        (Ok(mut term), Ok(mut interrupt)) => {
            tokio::select! {
                _ = term.recv() => {}
                _ = interrupt.recv() => {}
            }
        }
        (Ok(mut term), Err(_)) => {
            term.recv().await;
        }
        (Err(_), Ok(mut interrupt)) => {
            interrupt.recv().await;
        }
        (Err(_), Err(_)) => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    std::future::pending::<()>().await
}
