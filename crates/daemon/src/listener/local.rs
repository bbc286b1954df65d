// SPDX-License-Identifier: MIT

//! The local command endpoint (spec.md §4.H): an unauthenticated Unix
//! socket listener. Each accepted connection carries exactly one framed
//! request/response pair — a client opens a connection, writes one
//! message, reads the reply, and closes, the same pattern
//! `zallet_supervisor::client::call` uses from the other side.

use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use zallet_wire::{read_request, write_response, ProtocolError, Request};

use crate::operations;
use crate::state::AppState;

/// Accepts connections until `shutdown` fires, dispatching each to its own
/// task so one slow or misbehaving client never blocks another.
pub async fn serve(state: AppState, listener: UnixListener, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let state = state.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(state, stream).await {
                                tracing::debug!(%err, "local connection ended with error");
                            }
                        });
                    }
                    Err(err) => tracing::warn!(%err, "local socket accept failed"),
                }
            }
        }
    }
}

async fn handle_connection(state: AppState, mut stream: UnixStream) -> Result<(), ProtocolError> {
    let request: Request = read_request(&mut stream).await?;
    let response = operations::dispatch(&state, request).await;
    write_response(&mut stream, &response).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use zallet_wire::{encode, read_message, write_message, Response};

    #[tokio::test]
    async fn health_round_trips_over_the_socket() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sock_path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&sock_path).expect("bind");

        let config = crate::state::Config {
            base_dir: dir.path().to_path_buf(),
            sock_file: sock_path.clone(),
            lock_file: dir.path().join("zallet.pid"),
            instance_file: dir.path().join("instance"),
            log_dir: dir.path().join("log"),
            workflow_root: dir.path().join("workflow"),
            supervisor_bin: dir.path().join("zallets"),
            reconcile_interval_secs: 10,
            remote_addr: None,
            remote_token: None,
            callback_timeout_secs: 10,
        };
        let state = AppState::new(config, zallet_core::InstanceId::generate());
        let shutdown = CancellationToken::new();
        let server_state = state.clone();
        let server_shutdown = shutdown.clone();
        let server = tokio::spawn(async move { serve(server_state, listener, server_shutdown).await });

        let mut client = UnixStream::connect(&sock_path).await.expect("connect");
        write_message(&mut client, &encode(&Request::Health).expect("encode")).await.expect("write");
        let response: Response = zallet_wire::decode(&read_message(&mut client).await.expect("read"))
            .expect("decode");
        assert!(matches!(response, Response::Ok));

        shutdown.cancel();
        let _ = server.await;
    }
}
