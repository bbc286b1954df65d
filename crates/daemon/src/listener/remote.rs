// SPDX-License-Identifier: MIT

//! The remote command endpoint (spec.md §4.I): an authenticated TCP
//! listener for workflow submission, log retrieval, and ad-hoc stage
//! execution. Framing is identical to the local socket's (spec.md §4.H,
//! SPEC_FULL.md §4.I); the only difference is the transport and that every
//! operation here carries an opaque `t` token checked against
//! `ZALLET_REMOTE_TOKEN` before it is dispatched.

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use zallet_wire::{read_request, write_response, ProtocolError, Request, Response};

use crate::state::AppState;
use crate::workflow;

/// Accepts connections until `shutdown` fires. Each connection carries one
/// framed request/response pair, same as the local endpoint.
pub async fn serve(state: AppState, listener: TcpListener, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let state = state.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(state, stream).await {
                                tracing::debug!(%peer, %err, "remote connection ended with error");
                            }
                        });
                    }
                    Err(err) => tracing::warn!(%err, "remote socket accept failed"),
                }
            }
        }
    }
}

async fn handle_connection(state: AppState, mut stream: TcpStream) -> Result<(), ProtocolError> {
    let request: Request = read_request(&mut stream).await?;
    let response = dispatch(&state, request).await;
    write_response(&mut stream, &response).await
}

async fn dispatch(state: &AppState, request: Request) -> Response {
    let Some(configured_token) = state.config.remote_token.as_deref() else {
        return Response::error("remote endpoint has no ZALLET_REMOTE_TOKEN configured");
    };

    macro_rules! authed {
        ($token:expr, $body:expr) => {{
            if !token_matches(configured_token, &$token) {
                return unauthorized();
            }
            $body
        }};
    }

    match request {
        Request::ExecuteWorkflow { token, task_id, body, callback_url, callback_token } => authed!(
            token,
            workflow::execute_workflow(state, task_id, body, callback_url, callback_token).await
        ),
        Request::KillWorkflow { token, task_id } => {
            authed!(token, workflow::kill_workflow(state, &task_id).await)
        }
        Request::GetWorkflowTaskStatus { token, task_id } => {
            authed!(token, workflow::get_workflow_task_status(state, &task_id).await)
        }
        Request::GetWorkflowStepLog { token, task_id, job_name, step_index } => authed!(
            token,
            workflow::get_workflow_step_log(state, &task_id, &job_name, step_index).await
        ),
        Request::GetWorkflowTaskOrigin { token, task_id } => {
            authed!(token, workflow::get_workflow_task_origin(state, &task_id).await)
        }
        Request::Execute { token, service, task_id } => {
            authed!(token, workflow::execute_stage(state, service, task_id).await)
        }
        Request::KillStage { token, task_id } => {
            authed!(token, workflow::kill_stage(state, &task_id).await)
        }
        other => Response::error(format!("operation not served by the remote endpoint: {other:?}")),
    }
}

fn unauthorized() -> Response {
    Response::error("invalid or missing remote token")
}

/// A fixed-time comparison so a mismatched token's length of matching
/// prefix can't be inferred from how quickly this returns.
fn token_matches(configured: &str, supplied: &str) -> bool {
    let configured = configured.as_bytes();
    let supplied = supplied.as_bytes();
    if configured.len() != supplied.len() {
        return false;
    }
    configured.iter().zip(supplied).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}
