// SPDX-License-Identifier: MIT

//! Handlers for the remote command endpoint's workflow and ad-hoc stage
//! operations (spec.md §4.I): `executeWorkflow`, `killWorkflow`,
//! `getWorkflowTaskStatus`, `getWorkflowStepLog`, `getWorkflowTaskOrigin`,
//! `execute`, `kill`. Every operation here requires the opaque `t` token
//! the session carries (checked by `remote::dispatch` before these are
//! called).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use zallet_core::{Clock, JobGraphSpec, RunStatus, StageTaskId, TaskId};
use zallet_executor::{ArtifactCallbacks, ExecutorCallbacks, RunOpts};
use zallet_process::{Stdin, Stdout};
use zallet_wire::{JobStatusEntry, Response, StepStatusEntry, WorkflowTaskStatus};

use crate::state::AppState;

/// `executeWorkflow -i <taskId>`: validates the graph synchronously (so a
/// malformed submission is rejected before the caller stops listening for
/// an ack), then runs it in the background and posts the result to the
/// caller's callback URL when it finishes (spec.md §4.I, §2).
pub async fn execute_workflow(
    state: &AppState,
    task_id: String,
    body: String,
    callback_url: Option<String>,
    callback_token: Option<String>,
) -> Response {
    let Ok(task_id) = TaskId::parse(&task_id) else {
        return Response::error(format!("invalid workflow task id {task_id:?}"));
    };
    let graph: JobGraphSpec = match serde_yaml::from_str(&body) {
        Ok(graph) => graph,
        Err(err) => return Response::error(format!("invalid workflow spec: {err}")),
    };
    if let Err(err) = graph.validate_shape() {
        return Response::error(err.to_string());
    }
    if let Err(err) = zallet_dag::validate(&graph) {
        return Response::error(err.to_string());
    }

    let task_dir = state.artifacts.task_dir(&task_id);
    if let Err(err) = state.artifacts.create_task(&task_id, body.as_bytes()).await {
        return Response::error(format!("failed to create task artifacts: {err}"));
    }
    let begin_ms = state.clock_epoch_ms();
    if let Err(err) = state.artifacts.write_begin(&task_dir, begin_ms).await {
        return Response::error(format!("failed to write begin artifact: {err}"));
    }

    let cancel = CancellationToken::new();
    let task_id_str = task_id.as_str().to_string();
    state.tasks.lock().insert(task_id_str.clone(), cancel.clone());

    let state = state.clone();
    tokio::spawn(async move {
        run_workflow_task(state, task_id, graph, task_dir, begin_ms, cancel, callback_url, callback_token)
            .await;
    });

    Response::Accepted { task_id: task_id_str }
}

#[allow(clippy::too_many_arguments)]
async fn run_workflow_task(
    state: AppState,
    task_id: TaskId,
    graph: JobGraphSpec,
    task_dir: PathBuf,
    begin_ms: u64,
    cancel: CancellationToken,
    callback_url: Option<String>,
    callback_token: Option<String>,
) {
    let callbacks: Arc<dyn ExecutorCallbacks> = Arc::new(ArtifactCallbacks::new(
        state.artifacts.clone(),
        task_id.clone(),
        state.clock,
    ));
    let mut opts = RunOpts::new(task_dir.clone(), callbacks);
    opts.cancel = cancel;
    let clock = state.clock;
    opts.now_epoch_ms = Arc::new(move || clock.epoch_ms());

    let started = Instant::now();
    let result = state.executor.run(&graph, opts).await;
    let duration_millis = started.elapsed().as_millis() as u64;

    let status = match &result {
        Ok(()) => RunStatus::Success,
        Err(zallet_executor::ExecutorError::Cancelled) => RunStatus::Cancelled,
        Err(zallet_executor::ExecutorError::DeadlineExceeded(_)) => RunStatus::Timeout,
        Err(_) => RunStatus::Fail,
    };
    let _ = state.artifacts.write_status(&task_dir, status, duration_millis).await;
    if let Err(err) = &result {
        let _ = state.artifacts.write_error_log(&task_dir, &err.to_string()).await;
    }

    state.tasks.lock().remove(task_id.as_str());

    if let Some(url) = callback_url {
        post_callback(&state, &url, callback_token.as_deref(), &task_id, status, duration_millis).await;
    }
}

#[derive(Serialize)]
struct CallbackBody<'a> {
    task_id: &'a str,
    status: String,
    duration_millis: u64,
}

async fn post_callback(
    state: &AppState,
    url: &str,
    token: Option<&str>,
    task_id: &TaskId,
    status: RunStatus,
    duration_millis: u64,
) {
    let body = CallbackBody { task_id: task_id.as_str(), status: status.to_string(), duration_millis };
    let mut request = state.http.post(url).json(&body);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let timeout = Duration::from_secs(state.config.callback_timeout_secs);
    match tokio::time::timeout(timeout, request.send()).await {
        Ok(Ok(resp)) if !resp.status().is_success() => {
            tracing::warn!(%url, status = %resp.status(), "callback responded with non-success status");
        }
        Ok(Err(err)) => tracing::warn!(%url, %err, "callback request failed"),
        Err(_) => tracing::warn!(%url, "callback request timed out"),
        Ok(Ok(_)) => {}
    }
}

/// `killWorkflow -i <taskId>` (spec.md §4.I, §8 invariant 6): trips the
/// task's cancellation token; the executor's own step-kill path delivers
/// SIGTERM to each running step's pgid.
pub async fn kill_workflow(state: &AppState, task_id: &str) -> Response {
    if TaskId::parse(task_id).is_err() {
        return Response::error(format!("invalid workflow task id {task_id:?}"));
    }
    match state.tasks.lock().get(task_id) {
        Some(cancel) => {
            cancel.cancel();
            Response::Ok
        }
        None => Response::error(format!("workflow task {task_id} is not running")),
    }
}

/// `getWorkflowTaskStatus -i <taskId>`: rebuilds the aggregate purely from
/// the artifact tree (spec.md glossary: artifacts are "sufficient to
/// rebuild status without consulting any in-memory state").
pub async fn get_workflow_task_status(state: &AppState, task_id: &str) -> Response {
    let Ok(task_id) = TaskId::parse(task_id) else {
        return Response::error(format!("invalid workflow task id {task_id:?}"));
    };
    let task_dir = state.artifacts.task_dir(&task_id);
    let (status, duration_millis) = state.artifacts.read_status(&task_dir).await.unwrap_or((None, 0));

    let mut jobs = Vec::new();
    let mut job_names = match list_subdirs(&task_dir).await {
        Ok(names) => names,
        Err(err) => return Response::error(err.to_string()),
    };
    job_names.sort();
    for job_name in job_names {
        let job_dir = state.artifacts.job_dir(&task_id, &job_name);
        let (job_status, job_duration) =
            state.artifacts.read_status(&job_dir).await.unwrap_or((None, 0));
        let mut steps = Vec::new();
        let mut step_indices: Vec<usize> = list_subdirs(&job_dir)
            .await
            .unwrap_or_default()
            .into_iter()
            .filter_map(|name| name.parse().ok())
            .collect();
        step_indices.sort_unstable();
        for index in step_indices {
            let step_dir = state.artifacts.step_dir(&task_id, &job_name, index);
            let (step_status, step_duration) =
                state.artifacts.read_status(&step_dir).await.unwrap_or((None, 0));
            steps.push(StepStatusEntry {
                index,
                status: step_status.map(|s| s.to_string()),
                duration_millis: step_duration,
            });
        }
        jobs.push(JobStatusEntry {
            name: job_name,
            status: job_status.map(|s| s.to_string()),
            duration_millis: job_duration,
            steps,
        });
    }

    Response::WorkflowStatus(WorkflowTaskStatus {
        task_id: task_id.as_str().to_string(),
        status: status.map(|s| s.to_string()),
        duration_millis,
        jobs,
    })
}

async fn list_subdirs(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(names),
        Err(err) => return Err(err),
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// `getWorkflowStepLog -i <taskId> -j <jobName> -n <stepIndex>`: streams
/// the step's append-only `log` artifact back as one framed message
/// (spec.md §4.I).
pub async fn get_workflow_step_log(
    state: &AppState,
    task_id: &str,
    job_name: &str,
    step_index: usize,
) -> Response {
    let Ok(task_id) = TaskId::parse(task_id) else {
        return Response::error(format!("invalid workflow task id {task_id:?}"));
    };
    let dir = state.artifacts.step_dir(&task_id, job_name, step_index);
    match state.artifacts.read_log(&dir).await {
        Ok(data) => Response::Bytes { data },
        Err(err) => Response::error(err.to_string()),
    }
}

/// `getWorkflowTaskOrigin -i <taskId>`: returns the exact bytes the task
/// was submitted with.
pub async fn get_workflow_task_origin(state: &AppState, task_id: &str) -> Response {
    let Ok(task_id) = TaskId::parse(task_id) else {
        return Response::error(format!("invalid workflow task id {task_id:?}"));
    };
    match state.artifacts.read_origin(&task_id).await {
        Ok(data) => Response::Bytes { data },
        Err(err) => Response::error(err.to_string()),
    }
}

/// `execute -s <service> -i <taskId>`: runs an ad-hoc, one-off shell stage
/// outside any workflow DAG, under its own artifact directory keyed by the
/// caller-supplied 32-char stage taskId (spec.md §4.I, §3 `StageTaskId`).
pub async fn execute_stage(state: &AppState, service: String, task_id: String) -> Response {
    if StageTaskId::validate(&task_id).is_err() {
        return Response::error(format!("invalid stage task id {task_id:?}"));
    }
    let dir = state.config.base_dir.join("stage").join(&task_id);
    if let Err(err) = tokio::fs::create_dir_all(&dir).await {
        return Response::error(format!("failed to create stage dir: {err}"));
    }

    let cancel = CancellationToken::new();
    state.tasks.lock().insert(task_id.clone(), cancel.clone());

    let state = state.clone();
    let base_dir = state.config.base_dir.clone();
    tokio::spawn(async move {
        run_stage(state, service, dir, base_dir, cancel).await;
    });

    Response::Accepted { task_id }
}

async fn run_stage(
    state: AppState,
    service: String,
    dir: PathBuf,
    workdir: PathBuf,
    cancel: CancellationToken,
) {
    let begin_ms = state.clock_epoch_ms();
    let _ = state.artifacts.write_begin(&dir, begin_ms).await;
    let started = Instant::now();

    let log_file = match state.artifacts.open_log_appender(&dir).await {
        Ok(file) => file,
        Err(err) => {
            let _ = state.artifacts.write_error_log(&dir, &err.to_string()).await;
            let _ = state.artifacts.write_status(&dir, RunStatus::Fail, 0).await;
            return;
        }
    };

    let outcome = zallet_process::spawn(
        &workdir,
        &service,
        &[] as &[(String, String)],
        Stdin::Null,
        Stdout::Writer(log_file),
    )
    .await;

    let status = match outcome {
        Ok(handle) => {
            tokio::select! {
                result = handle.wait() => match result {
                    Ok(()) => RunStatus::Success,
                    Err(err) => {
                        let _ = state.artifacts.write_error_log(&dir, &err.to_string()).await;
                        RunStatus::Fail
                    }
                },
                () = cancel.cancelled() => {
                    let _ = handle.kill().await;
                    RunStatus::Cancelled
                }
            }
        }
        Err(err) => {
            let _ = state.artifacts.write_error_log(&dir, &err.to_string()).await;
            RunStatus::Fail
        }
    };

    let duration_millis = started.elapsed().as_millis() as u64;
    let _ = state.artifacts.write_status(&dir, status, duration_millis).await;
    let task_id_key = dir
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_default();
    state.tasks.lock().remove(&task_id_key);
}

/// `kill -i <taskId>` (the stage variant of cancellation; spec.md §4.I).
pub async fn kill_stage(state: &AppState, task_id: &str) -> Response {
    if StageTaskId::validate(task_id).is_err() {
        return Response::error(format!("invalid stage task id {task_id:?}"));
    }
    match state.tasks.lock().get(task_id) {
        Some(cancel) => {
            cancel.cancel();
            Response::Ok
        }
        None => Response::error(format!("stage task {task_id} is not running")),
    }
}

