// SPDX-License-Identifier: MIT

//! Request/response payloads for both the local command endpoint (spec.md
//! §4.H, unauthenticated, Unix socket) and the remote command endpoint
//! (spec.md §4.I, token-authenticated, TCP) — both framed the same way
//! (`crate::wire`), so they share one `Request`/`Response` pair with an
//! internally tagged `type` discriminant, the way the teacher's
//! `oj-wire::{Request, Response}` does for its own listener.

use serde::{Deserialize, Serialize};

use zallet_core::Status;

/// How `Apply`'s body is encoded; callers index into whichever the local
/// socket's framed "content-type tag" said (spec.md §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Json,
    Yaml,
}

/// A request frame. Local-endpoint operations (`Ls`..`ReportStat`) require
/// no authentication beyond the socket's own file permissions; remote
/// operations (`ExecuteWorkflow`..`KillStage`) each carry an opaque `token`
/// checked against a configured secret (spec.md §4.I).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Ls {
        #[serde(default)]
        app: Option<String>,
        #[serde(default)]
        global: bool,
        #[serde(default)]
        status: Option<Status>,
    },
    Kill {
        service_id: String,
    },
    Delete {
        service_id: String,
    },
    Restart {
        service_id: String,
    },
    Health,
    DaemonStatus,
    Apply {
        content_type: ContentType,
        body: String,
    },
    ReportStatus(ReportStatusReq),
    ReportDaemon(ReportDaemonReq),
    ReportProbe(ReportProbeReq),
    ReportStat(ReportStatReq),

    ExecuteWorkflow {
        token: String,
        task_id: String,
        body: String,
        /// Carries the session env vars `CALLBACK_URL`/`CALLBACK_TOKEN`
        /// (spec.md §4.I) as request fields, since this transport is one
        /// framed request per call rather than a persistent SSH session with
        /// its own environment.
        #[serde(default)]
        callback_url: Option<String>,
        #[serde(default)]
        callback_token: Option<String>,
    },
    KillWorkflow {
        token: String,
        task_id: String,
    },
    GetWorkflowTaskStatus {
        token: String,
        task_id: String,
    },
    GetWorkflowStepLog {
        token: String,
        task_id: String,
        job_name: String,
        step_index: usize,
    },
    GetWorkflowTaskOrigin {
        token: String,
        task_id: String,
    },
    Execute {
        token: String,
        service: String,
        task_id: String,
    },
    KillStage {
        token: String,
        task_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportStatusReq {
    pub service_id: String,
    pub pid: Option<u32>,
    pub event_time_ms: u64,
    pub status: Status,
    pub revision: u64,
    #[serde(default)]
    pub err_log: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDaemonReq {
    pub service_id: String,
    pub pid: u32,
    pub event_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProbeReq {
    pub service_id: String,
    pub event_time_ms: u64,
    pub is_success: bool,
    pub fail_count: u32,
    pub pid: u32,
    pub revision: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportStatReq {
    pub service_id: String,
    pub cpu_percent: f64,
    pub mem_percent: f64,
}

/// One row of `Ls`'s projection (spec.md §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub service_id: String,
    pub app: String,
    pub env: String,
    pub service_status: Status,
    pub pid: Option<u32>,
    pub agent_host: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepStatusEntry {
    pub index: usize,
    pub status: Option<String>,
    pub duration_millis: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusEntry {
    pub name: String,
    pub status: Option<String>,
    pub duration_millis: u64,
    pub steps: Vec<StepStatusEntry>,
}

/// `getWorkflowTaskStatus`'s aggregate, rebuilt from the artifact store
/// alone (spec.md glossary: "Artifact ... sufficient to rebuild its status
/// without consulting any in-memory state").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTaskStatus {
    pub task_id: String,
    pub status: Option<String>,
    pub duration_millis: u64,
    pub jobs: Vec<JobStatusEntry>,
}

/// A response frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Ok,
    Text { message: String },
    Error { message: String },
    Services { services: Vec<ServiceSummary> },
    Exist { exist: bool, message: String },
    DaemonStatus { uptime_secs: u64, service_count: usize },
    WorkflowStatus(WorkflowTaskStatus),
    Bytes { data: Vec<u8> },
    Accepted { task_id: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error { message: message.into() }
    }

    pub fn text(message: impl Into<String>) -> Self {
        Response::Text { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_json_tag() {
        let req = Request::Kill { service_id: "abc".into() };
        let json = serde_json::to_string(&req).expect("encode");
        assert!(json.contains("\"type\":\"Kill\""));
        let decoded: Request = serde_json::from_str(&json).expect("decode");
        match decoded {
            Request::Kill { service_id } => assert_eq!(service_id, "abc"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn response_error_helper_matches_manual_construction() {
        assert!(matches!(Response::error("boom"), Response::Error { message } if message == "boom"));
    }
}
