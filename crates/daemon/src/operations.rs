// SPDX-License-Identifier: MIT

//! Handlers for the local command endpoint's operations (spec.md §4.F,
//! §4.H): apply/kill/delete/restart/ls/health/status, plus the four
//! report* callbacks a supervisor phones home with.

use std::path::Path;
use std::sync::Arc;

use zallet_core::{ServiceId, ServiceRecord, ServiceSpec, Status};
use zallet_storage::CatalogFilter;
use zallet_wire::{ContentType, Request, Response, ServiceSummary};

use crate::state::AppState;

const MAX_KILL_REVISION_RETRIES: u32 = 8;

pub async fn dispatch(state: &AppState, request: Request) -> Response {
    match request {
        Request::Ls { app, global, status } => ls(state, app, global, status).await,
        Request::Kill { service_id } => kill(state, &service_id).await,
        Request::Delete { service_id } => delete(state, &service_id).await,
        Request::Restart { service_id } => restart(state, &service_id).await,
        Request::Health => Response::Ok,
        Request::DaemonStatus => daemon_status(state).await,
        Request::Apply { content_type, body } => apply(state, content_type, &body).await,
        Request::ReportStatus(req) => report_status(state, req).await,
        Request::ReportDaemon(req) => report_daemon(state, req).await,
        Request::ReportProbe(req) => report_probe(state, req).await,
        Request::ReportStat(req) => report_stat(state, req).await,
        other => Response::error(format!("operation not served by the local endpoint: {other:?}")),
    }
}

async fn ls(state: &AppState, app: Option<String>, global: bool, status: Option<Status>) -> Response {
    let filter = CatalogFilter {
        instance_id: Some(state.instance_id.clone()),
        global,
        app,
        status,
    };
    match state.catalog.list(&filter).await {
        Ok(rows) => Response::Services { services: rows.iter().map(summarize).collect() },
        Err(err) => Response::error(err.to_string()),
    }
}

fn summarize(record: &ServiceRecord) -> ServiceSummary {
    ServiceSummary {
        service_id: record.id.as_str().to_string(),
        app: record.spec.app.clone(),
        env: record.spec.env.clone(),
        service_status: record.status,
        pid: record.pid,
        agent_host: record.agent_host.clone(),
    }
}

async fn daemon_status(state: &AppState) -> Response {
    let filter = CatalogFilter { instance_id: Some(state.instance_id.clone()), ..Default::default() };
    let service_count = match state.catalog.list(&filter).await {
        Ok(rows) => rows.len(),
        Err(err) => return Response::error(err.to_string()),
    };
    Response::DaemonStatus { uptime_secs: state.start_time.elapsed().as_secs(), service_count }
}

async fn apply(state: &AppState, content_type: ContentType, body: &str) -> Response {
    let spec: ServiceSpec = match content_type {
        ContentType::Json => match serde_json::from_str(body) {
            Ok(spec) => spec,
            Err(err) => return Response::error(format!("invalid json spec: {err}")),
        },
        ContentType::Yaml => match serde_yaml::from_str(body) {
            Ok(spec) => spec,
            Err(err) => return Response::error(format!("invalid yaml spec: {err}")),
        },
    };
    if let Err(err) = spec.validate() {
        return Response::error(err.to_string());
    }
    if let Some(workdir) = &spec.workdir {
        match std::fs::metadata(workdir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Response::error(format!("workdir {workdir:?} is not a directory")),
            Err(err) => return Response::error(format!("workdir {workdir:?}: {err}")),
        }
    }

    let epoch_ms = state.clock_epoch_ms();
    let service_id = ServiceId::generate_at(epoch_ms, &zallet_core::format_yyyymmddhhmmss(epoch_ms));

    let log_path = supervisor_log_path(&state.config.log_dir, epoch_ms, &service_id);
    let log_file = match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .await
    {
        Ok(file) => file,
        Err(err) => {
            if let Some(parent) = log_path.parent() {
                if tokio::fs::create_dir_all(parent).await.is_ok() {
                    match tokio::fs::OpenOptions::new().create(true).append(true).open(&log_path).await {
                        Ok(file) => file,
                        Err(err) => return Response::error(format!("failed to open log file: {err}")),
                    }
                } else {
                    return Response::error(format!("failed to open log file: {err}"));
                }
            } else {
                return Response::error(format!("failed to open log file: {err}"));
            }
        }
    };

    let opts = zallet_supervisor::SupervisorOpts {
        service_id: service_id.clone(),
        spec: spec.clone(),
        base_dir: state.config.base_dir.clone(),
        sock_file: state.config.sock_file.clone(),
        envs: Default::default(),
    };
    let opts_json = match serde_json::to_vec(&opts) {
        Ok(bytes) => bytes,
        Err(err) => return Response::error(format!("failed to encode supervisor opts: {err}")),
    };

    let handle = match zallet_process::spawn(
        &state.config.base_dir,
        &format!("{} ", state.config.supervisor_bin.display()),
        &[],
        zallet_process::Stdin::Bytes(opts_json),
        zallet_process::Stdout::Writer(log_file),
    )
    .await
    {
        Ok(handle) => handle,
        Err(err) => return Response::error(format!("failed to spawn supervisor: {err}")),
    };
    let pid = handle.pid();

    let record = ServiceRecord {
        id: service_id.clone(),
        spec,
        status: Status::Pending,
        instance_id: Some(state.instance_id.clone()),
        pid,
        agent_host: state.config.remote_addr.clone(),
        agent_token: None,
        err_log: None,
        probe_fail_count: 0,
        probe_timestamp_ms: None,
        cpu_percent: None,
        mem_percent: None,
        revision: 1,
        created_at_ms: epoch_ms,
        updated_at_ms: epoch_ms,
    };
    if let Err(err) = state.catalog.insert(record).await {
        let _ = handle.kill().await;
        return Response::error(format!("failed to persist service record: {err}"));
    }

    state.supervisors.lock().insert(service_id.as_str().to_string(), Arc::new(handle));
    spawn_reaper(state.clone(), service_id.clone());

    Response::Text { message: service_id.as_str().to_string() }
}

fn supervisor_log_path(log_dir: &Path, epoch_ms: u64, service_id: &ServiceId) -> std::path::PathBuf {
    let date = zallet_core::format_yyyymmddhhmmss(epoch_ms);
    log_dir
        .join(&date[0..4])
        .join(&date[4..6])
        .join(&date[6..8])
        .join(format!("{service_id}.log"))
}

/// Once the supervisor exits on its own (not via `Kill`'s explicit
/// `.kill()`), its handle is stale; drop it so `Kill` doesn't try to signal
/// a pid that's already gone.
fn spawn_reaper(state: AppState, service_id: ServiceId) {
    tokio::spawn(async move {
        let handle = state.supervisors.lock().get(service_id.as_str()).cloned();
        if let Some(handle) = handle {
            let _ = handle.wait().await;
        }
        state.supervisors.lock().remove(service_id.as_str());
    });
}

async fn kill(state: &AppState, service_id: &str) -> Response {
    let Ok(id) = ServiceId::from_string(service_id) else {
        return Response::error(format!("invalid service id {service_id:?}"));
    };
    let mut updated = false;
    for _ in 0..MAX_KILL_REVISION_RETRIES {
        let Some(record) = state.catalog.get_by_id_and_instance(&id, &state.instance_id).await.ok().flatten() else {
            return Response::error(format!("service {service_id} not found"));
        };
        let next_revision = record.revision + 1;
        match state
            .catalog
            .update_status(&id, Status::Killed, next_revision, None, state.clock_epoch_ms(), record.pid)
            .await
        {
            Ok(true) => {
                updated = true;
                break;
            }
            Ok(false) => continue,
            Err(err) => return Response::error(err.to_string()),
        }
    }
    if !updated {
        return Response::error(format!("service {service_id}: too many concurrent updates"));
    }

    if let Some(handle) = state.supervisors.lock().get(service_id).cloned() {
        if let Err(err) = handle.kill().await {
            return Response::error(err.to_string());
        }
    }
    Response::Ok
}

async fn delete(state: &AppState, service_id: &str) -> Response {
    let Ok(id) = ServiceId::from_string(service_id) else {
        return Response::error(format!("invalid service id {service_id:?}"));
    };
    if state.catalog.get_by_id_and_instance(&id, &state.instance_id).await.ok().flatten().is_none() {
        return Response::error(format!("service {service_id} not found"));
    }
    if let Some(handle) = state.supervisors.lock().remove(service_id) {
        let _ = handle.kill().await;
    }
    match state.catalog.delete_by_id(&id).await {
        Ok(Some(_)) => Response::Ok,
        Ok(None) => Response::error(format!("service {service_id} not found")),
        Err(err) => Response::error(err.to_string()),
    }
}

async fn restart(state: &AppState, service_id: &str) -> Response {
    let Ok(id) = ServiceId::from_string(service_id) else {
        return Response::error(format!("invalid service id {service_id:?}"));
    };
    let record = match state.catalog.get_by_id_and_instance(&id, &state.instance_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return Response::error(format!("service {service_id} not found")),
        Err(err) => return Response::error(err.to_string()),
    };
    if let Some(handle) = state.supervisors.lock().remove(service_id) {
        let _ = handle.kill().await;
    }
    if let Err(err) = state.catalog.delete_by_id(&id).await {
        return Response::error(err.to_string());
    }
    let body = match serde_json::to_string(&record.spec) {
        Ok(body) => body,
        Err(err) => return Response::error(err.to_string()),
    };
    apply(state, ContentType::Json, &body).await
}

async fn report_status(state: &AppState, req: zallet_wire::ReportStatusReq) -> Response {
    let Ok(id) = ServiceId::from_string(&req.service_id) else {
        return Response::error(format!("invalid service id {:?}", req.service_id));
    };
    match state
        .catalog
        .update_status(&id, req.status, req.revision, req.err_log, req.event_time_ms, req.pid)
        .await
    {
        Ok(_) => Response::Ok,
        Err(err) => Response::error(err.to_string()),
    }
}

/// A supervisor's heartbeat: answers whether the daemon still considers it
/// the owner of `serviceId` (spec.md §4.F: "`exist=true` iff a row exists
/// with matching serviceId and pid; otherwise false with a human
/// message"). Never mutates the catalog — that's `reportStatus`'s job.
async fn report_daemon(state: &AppState, req: zallet_wire::ReportDaemonReq) -> Response {
    let Ok(id) = ServiceId::from_string(&req.service_id) else {
        return Response::error(format!("invalid service id {:?}", req.service_id));
    };
    match state.catalog.get_by_id(&id).await {
        Ok(Some(record)) if record.pid == Some(req.pid) => {
            Response::Exist { exist: true, message: "ok".into() }
        }
        Ok(Some(_)) => Response::Exist {
            exist: false,
            message: format!("service {} is owned by a different pid", req.service_id),
        },
        Ok(None) => Response::Exist {
            exist: false,
            message: format!("service {} not found", req.service_id),
        },
        Err(err) => Response::Exist { exist: false, message: err.to_string() },
    }
}

async fn report_probe(state: &AppState, req: zallet_wire::ReportProbeReq) -> Response {
    let Ok(id) = ServiceId::from_string(&req.service_id) else {
        return Response::error(format!("invalid service id {:?}", req.service_id));
    };
    match state
        .catalog
        .update_probe(&id, req.event_time_ms, req.is_success, req.fail_count, req.revision)
        .await
    {
        Ok(_) => Response::Ok,
        Err(err) => Response::error(err.to_string()),
    }
}

async fn report_stat(state: &AppState, req: zallet_wire::ReportStatReq) -> Response {
    let Ok(id) = ServiceId::from_string(&req.service_id) else {
        return Response::error(format!("invalid service id {:?}", req.service_id));
    };
    match state.catalog.update_cpu_mem(&id, Some(req.cpu_percent), Some(req.mem_percent)).await {
        Ok(_) => Response::Ok,
        Err(err) => Response::error(err.to_string()),
    }
}
