// SPDX-License-Identifier: MIT

//! Workspace-level acceptance tests (spec.md §8, scenarios S1-S6): each
//! spins up a real `zalletd` against an isolated `ZALLET_BASE_DIR`, drives
//! it through the `zallet` CLI and/or the raw wire protocol, and asserts
//! the externally observable outcome spec.md describes.

use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::{Duration, Instant};

use assert_cmd::cargo::cargo_bin;
use serial_test::serial;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use zallet_wire::{decode, encode, Request, Response};

const WAIT_MAX: Duration = Duration::from_secs(10);

/// Polls `check` every 50ms until it returns `true` or `WAIT_MAX` elapses.
fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_MAX;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

/// A free, ephemeral TCP port on loopback. Racy (the listener is dropped
/// before the daemon binds it), but good enough for a short-lived test.
fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local_addr").port()
}

struct Daemon {
    _dir: TempDir,
    base_dir: PathBuf,
    remote_addr: Option<String>,
    remote_token: Option<String>,
    child: Child,
}

impl Daemon {
    fn start() -> Self {
        Self::start_with_remote(false)
    }

    fn start_with_remote(remote: bool) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let base_dir = dir.path().to_path_buf();
        let remote_addr = remote.then(|| format!("127.0.0.1:{}", free_port()));
        let remote_token = remote.then(|| "test-token".to_string());

        let mut cmd = Command::new(cargo_bin("zalletd"));
        cmd.env("ZALLET_BASE_DIR", &base_dir)
            .env("ZALLET_SUPERVISOR_BIN", cargo_bin("zallets"))
            .env("ZALLET_LOG", "error")
            .env("ZALLET_RECONCILE_INTERVAL_SECS", "1");
        if let Some(addr) = &remote_addr {
            cmd.env("ZALLET_REMOTE_ADDR", addr);
        }
        if let Some(token) = &remote_token {
            cmd.env("ZALLET_REMOTE_TOKEN", token);
        }
        let child = cmd.spawn().expect("spawn zalletd");

        let sock_file = base_dir.join("zallet.sock");
        let ready = wait_for(|| sock_file.exists());
        assert!(ready, "daemon did not create its socket in time");

        Daemon { _dir: dir, base_dir, remote_addr, remote_token, child }
    }

    fn zallet(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(cargo_bin("zallet"));
        cmd.env("ZALLET_BASE_DIR", &self.base_dir).args(args);
        cmd
    }

    fn log_dir(&self) -> PathBuf {
        self.base_dir.join("log")
    }

    async fn remote_call(&self, request: &Request) -> Response {
        let addr = self.remote_addr.as_deref().expect("remote endpoint not enabled");
        let mut stream = TcpStream::connect(addr).await.expect("connect to remote endpoint");
        let payload = encode(request).expect("encode request");
        stream.write_all(&(payload.len() as u32).to_be_bytes()).await.expect("write len");
        stream.write_all(&payload).await.expect("write payload");
        stream.flush().await.expect("flush");

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.expect("read len");
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await.expect("read body");
        decode(&buf).expect("decode response")
    }

    fn token(&self) -> String {
        self.remote_token.clone().expect("remote token not enabled")
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn find_file(root: &Path, name: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(root).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_file(&path, name) {
                return Some(found);
            }
        } else if path.file_name().and_then(|n| n.to_str()) == Some(name) {
            return Some(path);
        }
    }
    None
}

fn extract_service_id(apply_stdout: &str) -> String {
    // `print_message` renders "service <id> applied".
    apply_stdout
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .to_string()
}

#[test]
#[serial]
fn s1_apply_run_clean_exit() {
    let daemon = Daemon::start();

    let spec = "env: dev\napp: echo\nstart: \"sh -c 'echo hi; sleep 0.1'\"\n";
    let spec_file = tempfile::NamedTempFile::new().expect("tempfile");
    std::fs::write(spec_file.path(), spec).expect("write spec");

    let output = daemon
        .zallet(&["apply", spec_file.path().to_str().expect("utf8 path")])
        .output()
        .expect("run apply");
    assert!(output.status.success(), "apply failed: {}", String::from_utf8_lossy(&output.stderr));
    let service_id = extract_service_id(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(service_id.len(), 32, "service id should be 32 chars: {service_id:?}");

    let reached_shutdown = wait_for(|| {
        let out = daemon.zallet(&["ls"]).output().expect("ls");
        let stdout = String::from_utf8_lossy(&out.stdout);
        stdout.contains(&service_id) && stdout.contains("shutdown")
    });
    assert!(reached_shutdown, "service never reached shutdown status");

    let log_file = find_file(&daemon.log_dir(), &format!("{service_id}.log"));
    let log_file = log_file.expect("supervisor log file should exist");
    let content = wait_for_content(&log_file, "hi\n");
    assert!(content.ends_with("hi\n"), "log should end with \"hi\\n\", got {content:?}");
}

fn wait_for_content(path: &Path, expected_suffix: &str) -> String {
    let mut content = String::new();
    wait_for(|| {
        content = std::fs::read_to_string(path).unwrap_or_default();
        content.ends_with(expected_suffix)
    });
    content
}

#[test]
#[serial]
fn s2_probe_driven_restart() {
    let daemon = Daemon::start();

    let spec = "\
env: dev
app: flaky
start: \"sh -c 'sleep 10 & wait'\"
probe:
  type: tcp
  host: \"127.0.0.1:1\"
  interval: \"100ms\"
  onFail:
    times: 3
    action: \"echo fail\"
";
    let spec_file = tempfile::NamedTempFile::new().expect("tempfile");
    std::fs::write(spec_file.path(), spec).expect("write spec");

    let output = daemon
        .zallet(&["apply", spec_file.path().to_str().expect("utf8 path")])
        .output()
        .expect("run apply");
    assert!(output.status.success(), "apply failed: {}", String::from_utf8_lossy(&output.stderr));
    let service_id = extract_service_id(&String::from_utf8_lossy(&output.stdout));

    let first_pid = wait_for_pid(&daemon, &service_id);
    assert!(first_pid.is_some(), "service never reported a pid");

    let restarted = wait_for(|| {
        let out = daemon.zallet(&["ls"]).output().expect("ls");
        String::from_utf8_lossy(&out.stdout).contains(&service_id)
            && wait_for_pid(&daemon, &service_id) != first_pid
    });
    assert!(restarted, "no new supervisor-child pid observed after repeated probe failures");
}

fn wait_for_pid(daemon: &Daemon, service_id: &str) -> Option<u32> {
    let out = daemon.zallet(&["ls"]).output().ok()?;
    let stdout = String::from_utf8_lossy(&out.stdout);
    for line in stdout.lines() {
        if line.starts_with(service_id) {
            return line.split_whitespace().nth(4).and_then(|p| p.parse().ok());
        }
    }
    None
}

#[test]
#[serial]
fn s3_graph_cycle_is_rejected() {
    let daemon = Daemon::start_with_remote(true);
    let rt = tokio::runtime::Runtime::new().expect("runtime");

    let body = "\
jobs:
  a:
    needs: [b]
    steps:
      - name: only
        script: \"true\"
  b:
    needs: [a]
    steps:
      - name: only
        script: \"true\"
";
    let response = rt.block_on(daemon.remote_call(&Request::ExecuteWorkflow {
        token: daemon.token(),
        task_id: "2024010100bbbbbbbbbbbbbbbbbbbbbb".to_string(),
        body: body.to_string(),
        callback_url: None,
        callback_token: None,
    }));
    match response {
        Response::Error { message } => assert!(
            message.contains("round job"),
            "expected a cycle-rejection message, got {message:?}"
        ),
        other => panic!("expected Response::Error for a cyclic graph, got {other:?}"),
    }
}

#[test]
#[serial]
fn s4_workflow_success_with_dependency() {
    let daemon = Daemon::start_with_remote(true);
    let rt = tokio::runtime::Runtime::new().expect("runtime");

    let task_id = "2024010100aaaaaaaaaaaaaaaaaaaaaa";
    let body = "\
jobs:
  x:
    steps:
      - name: only
        script: \"echo 1\"
  y:
    needs: [x]
    steps:
      - name: only
        script: \"echo 2\"
";
    let response = rt.block_on(daemon.remote_call(&Request::ExecuteWorkflow {
        token: daemon.token(),
        task_id: task_id.to_string(),
        body: body.to_string(),
        callback_url: None,
        callback_token: None,
    }));
    assert!(matches!(response, Response::Accepted { .. }), "unexpected response: {response:?}");

    let finished = wait_for(|| {
        let status = rt.block_on(daemon.remote_call(&Request::GetWorkflowTaskStatus {
            token: daemon.token(),
            task_id: task_id.to_string(),
        }));
        matches!(status, Response::WorkflowStatus(s) if s.status.as_deref() == Some("success"))
    });
    assert!(finished, "workflow task never reached success");

    let task_dir = daemon
        .base_dir
        .join("workflow")
        .join("action")
        .join("2024")
        .join("01")
        .join("01")
        .join("00")
        .join("aaaaaaaaaaaaaaaaaaaaaa");
    let x_log = task_dir.join("x").join("0").join("log");
    let y_log = task_dir.join("y").join("0").join("log");
    let x_content = wait_for_content(&x_log, "1\n");
    let y_content = wait_for_content(&y_log, "2\n");
    assert!(x_content.contains('1'), "job x's step log should contain \"1\"");
    assert!(y_content.contains('2'), "job y's step log should contain \"2\"");
}

#[test]
#[serial]
fn s5_per_job_timeout() {
    let daemon = Daemon::start_with_remote(true);
    let rt = tokio::runtime::Runtime::new().expect("runtime");

    let task_id = "2024010100cccccccccccccccccccccc";
    let body = "\
jobs:
  x:
    timeout: \"100ms\"
    steps:
      - name: only
        script: \"sleep 5\"
";
    let response = rt.block_on(daemon.remote_call(&Request::ExecuteWorkflow {
        token: daemon.token(),
        task_id: task_id.to_string(),
        body: body.to_string(),
        callback_url: None,
        callback_token: None,
    }));
    assert!(matches!(response, Response::Accepted { .. }), "unexpected response: {response:?}");

    let started = Instant::now();
    let finished = wait_for(|| {
        let status = rt.block_on(daemon.remote_call(&Request::GetWorkflowTaskStatus {
            token: daemon.token(),
            task_id: task_id.to_string(),
        }));
        matches!(status, Response::WorkflowStatus(s) if s.status.as_deref() == Some("timeout"))
    });
    assert!(finished, "job never reported a timeout status");
    assert!(started.elapsed() < Duration::from_secs(5), "timeout took too long to resolve");

    let status = rt.block_on(daemon.remote_call(&Request::GetWorkflowTaskStatus {
        token: daemon.token(),
        task_id: task_id.to_string(),
    }));
    let Response::WorkflowStatus(status) = status else { panic!("expected WorkflowStatus") };
    let job = status.jobs.iter().find(|j| j.name == "x").expect("job x present");
    let step = job.steps.first().expect("job x has one step");
    assert_eq!(step.status.as_deref(), Some("fail"));
}

#[test]
#[serial]
fn s6_kill_resolves_revision_race() {
    let daemon = Daemon::start();

    let spec = "env: dev\napp: longrunning\nstart: \"sh -c 'sleep 30'\"\n";
    let spec_file = tempfile::NamedTempFile::new().expect("tempfile");
    std::fs::write(spec_file.path(), spec).expect("write spec");

    let output = daemon
        .zallet(&["apply", spec_file.path().to_str().expect("utf8 path")])
        .output()
        .expect("run apply");
    assert!(output.status.success());
    let service_id = extract_service_id(&String::from_utf8_lossy(&output.stdout));

    let running = wait_for(|| {
        let out = daemon.zallet(&["ls"]).output().expect("ls");
        String::from_utf8_lossy(&out.stdout).contains("running")
    });
    assert!(running, "service never reached running status");

    let kill_output = daemon.zallet(&["kill", &service_id]).output().expect("kill");
    assert!(kill_output.status.success(), "kill should succeed");

    let killed = wait_for(|| {
        let out = daemon.zallet(&["ls"]).output().expect("ls");
        let stdout = String::from_utf8_lossy(&out.stdout);
        stdout.contains(&service_id) && stdout.contains("killed")
    });
    assert!(killed, "service never reached killed status");
}

/// Sanity check that the CLI binary itself is reachable through cargo's
/// shared workspace target directory before any scenario depends on it.
#[test]
fn zallet_binary_resolves_and_runs() {
    let output = Command::new(cargo_bin("zallet")).arg("--help").output().expect("run zallet --help");
    assert!(output.status.success());
}
