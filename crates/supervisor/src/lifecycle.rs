// SPDX-License-Identifier: MIT

//! The supervisor's state machine and run loop (spec.md §4.E): spawn the
//! child, report status transitions to the daemon, and run three
//! independent background loops (daemon heartbeat, stats sampler, probe)
//! until the child exits, a probe triggers a restart, or a shutdown is
//! requested.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use zallet_core::{Clock, Probe, ServiceId, Status, SystemClock};
use zallet_process::{Handle, Stdin, Stdout};
use zallet_wire::{
    ReportDaemonReq, ReportProbeReq, ReportStatReq, ReportStatusReq, Request, Response,
};

use crate::client;
use crate::error::SupervisorError;
use crate::opts::SupervisorOpts;
use crate::probe_check;
use crate::stats::StatsSampler;

const DAEMON_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);
const STATS_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

fn now_epoch_ms() -> u64 {
    SystemClock.epoch_ms()
}

/// State shared across a supervisor instance's background loops: the
/// revision counter and probe fail counter both outlive any single child
/// respawn (spec.md §4.E: "re-enters start" keeps reporting on the same
/// serviceId's revision sequence).
struct Shared {
    service_id: ServiceId,
    sock_file: PathBuf,
    revision: AtomicU64,
    probe_fail_count: AtomicU32,
}

impl Shared {
    fn new(service_id: ServiceId, sock_file: PathBuf) -> Self {
        Self {
            service_id,
            sock_file,
            revision: AtomicU64::new(0),
            probe_fail_count: AtomicU32::new(0),
        }
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Signal sent from a background loop to the instance's main select,
/// requesting that the current child be torn down.
enum ControlSignal {
    Restart,
    Shutdown(String),
}

enum InstanceOutcome {
    Restart,
    Done(Result<(), SupervisorError>),
}

/// Runs one service for its entire lifetime: spawns the child per
/// `opts.spec`, reports status transitions, and loops on probe-triggered
/// restarts until the child exits cleanly, fails, or a shutdown fires.
pub async fn run(opts: SupervisorOpts) -> Result<(), SupervisorError> {
    opts.validate()?;
    let shared = Arc::new(Shared::new(opts.service_id.clone(), opts.sock_file.clone()));
    let workdir = resolve_workdir(&opts);
    let env_pairs = build_env(&opts);

    loop {
        match run_instance(&opts, &shared, &workdir, &env_pairs).await {
            InstanceOutcome::Restart => continue,
            InstanceOutcome::Done(result) => return result,
        }
    }
}

fn resolve_workdir(opts: &SupervisorOpts) -> PathBuf {
    match &opts.spec.workdir {
        Some(workdir) => PathBuf::from(workdir),
        None => opts.base_dir.clone(),
    }
}

/// `opts.envs` (passed by the daemon at `apply` time, e.g. identifying
/// variables) are appended after the spec's own declared `with` map, later
/// entries winning on a duplicate key, matching `ServiceSpec::env_pairs`'s
/// own merge rule (`original_source/internal/util/util.go`'s `MergeEnvs`).
fn build_env(opts: &SupervisorOpts) -> Vec<(String, String)> {
    let mut pairs = opts.spec.env_pairs();
    pairs.extend(opts.envs.iter().map(|(k, v)| (k.clone(), v.clone())));
    pairs
}

async fn run_instance(
    opts: &SupervisorOpts,
    shared: &Arc<Shared>,
    workdir: &Path,
    env_pairs: &[(String, String)],
) -> InstanceOutcome {
    report_status(shared, Status::Starting, None, None).await;

    let handle = match zallet_process::spawn(
        workdir,
        &opts.spec.start,
        env_pairs,
        Stdin::Null,
        Stdout::<tokio::io::Sink>::Inherit,
    )
    .await
    {
        Ok(handle) => handle,
        Err(err) => {
            let message = err.to_string();
            report_status(shared, Status::Failed, None, Some(message.clone())).await;
            return InstanceOutcome::Done(Err(SupervisorError::ChildFailed(message)));
        }
    };

    let pid = handle.pid().unwrap_or(0);
    report_status(shared, Status::Running, Some(pid), None).await;

    let (control_tx, mut control_rx) = mpsc::channel::<ControlSignal>(8);
    let loop_cancel = CancellationToken::new();

    let heartbeat_task = tokio::spawn(heartbeat_loop(
        Arc::clone(shared),
        pid,
        control_tx.clone(),
        loop_cancel.child_token(),
    ));
    let stats_task = tokio::spawn(stats_loop(Arc::clone(shared), pid, loop_cancel.child_token()));
    let probe_task = opts.spec.probe.clone().map(|probe| {
        tokio::spawn(probe_loop(
            Arc::clone(shared),
            probe,
            pid,
            workdir.to_path_buf(),
            env_pairs.to_vec(),
            control_tx.clone(),
            loop_cancel.child_token(),
        ))
    });
    drop(control_tx);

    let outcome = wait_for_instance_end(&handle, &mut control_rx).await;

    loop_cancel.cancel();
    heartbeat_task.abort();
    stats_task.abort();
    if let Some(task) = probe_task {
        task.abort();
    }

    match outcome {
        InstanceEnd::ExitedCleanly => {
            report_status(shared, Status::Shutdown, None, None).await;
            InstanceOutcome::Done(Ok(()))
        }
        InstanceEnd::ExitedWithError(message) => {
            report_status(shared, Status::Failed, None, Some(message.clone())).await;
            InstanceOutcome::Done(Err(SupervisorError::ChildFailed(message)))
        }
        InstanceEnd::Restart => {
            // Status::Restart was already reported by probe_loop before it
            // killed the child (spec.md §4.E ordering: report, run onFail
            // action, kill, re-enter start).
            shared.probe_fail_count.store(0, Ordering::SeqCst);
            InstanceOutcome::Restart
        }
        InstanceEnd::Shutdown(message) => {
            report_status(shared, Status::Shutdown, None, Some(message)).await;
            InstanceOutcome::Done(Ok(()))
        }
    }
}

enum InstanceEnd {
    ExitedCleanly,
    ExitedWithError(String),
    Restart,
    Shutdown(String),
}

async fn wait_for_instance_end(
    handle: &Handle,
    control_rx: &mut mpsc::Receiver<ControlSignal>,
) -> InstanceEnd {
    tokio::select! {
        wait_result = handle.wait() => match wait_result {
            Ok(()) => InstanceEnd::ExitedCleanly,
            Err(err) => InstanceEnd::ExitedWithError(err.to_string()),
        },
        signal = control_rx.recv() => {
            let _ = handle.kill().await;
            match signal {
                Some(ControlSignal::Restart) => InstanceEnd::Restart,
                Some(ControlSignal::Shutdown(message)) => InstanceEnd::Shutdown(message),
                None => InstanceEnd::Shutdown("control channel closed".into()),
            }
        }
        () = wait_for_termination_signal() => {
            let _ = handle.kill().await;
            InstanceEnd::Shutdown("supervisor received a termination signal".into())
        }
    }
}

async fn report_status(
    shared: &Shared,
    status: Status,
    pid: Option<u32>,
    err_log: Option<String>,
) {
    let revision = shared.next_revision();
    let request = Request::ReportStatus(ReportStatusReq {
        service_id: shared.service_id.as_str().to_string(),
        pid,
        event_time_ms: now_epoch_ms(),
        status,
        revision,
        err_log,
    });
    if let Err(err) = client::call(&shared.sock_file, &request).await {
        tracing::warn!(%err, ?status, "failed to report status to daemon");
    }
}

async fn heartbeat_loop(
    shared: Arc<Shared>,
    pid: u32,
    control_tx: mpsc::Sender<ControlSignal>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(DAEMON_HEARTBEAT_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }
        let request = Request::ReportDaemon(ReportDaemonReq {
            service_id: shared.service_id.as_str().to_string(),
            pid,
            event_time_ms: now_epoch_ms(),
        });
        match client::call(&shared.sock_file, &request).await {
            Ok(Response::Exist { exist: false, message }) => {
                let _ = control_tx.send(ControlSignal::Shutdown(message)).await;
                return;
            }
            Ok(_) => {}
            Err(err) => tracing::debug!(%err, "daemon heartbeat failed"),
        }
    }
}

async fn stats_loop(shared: Arc<Shared>, pid: u32, cancel: CancellationToken) {
    let mut sampler = StatsSampler::new(pid);
    let mut interval = tokio::time::interval(STATS_SAMPLE_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }
        let (cpu_percent, mem_percent) = sampler.sample();
        let (Some(cpu_percent), Some(mem_percent)) = (cpu_percent, mem_percent) else {
            continue;
        };
        let request = Request::ReportStat(ReportStatReq {
            service_id: shared.service_id.as_str().to_string(),
            cpu_percent,
            mem_percent,
        });
        if let Err(err) = client::call(&shared.sock_file, &request).await {
            tracing::debug!(%err, "stats report failed");
        }
    }
}

async fn probe_loop(
    shared: Arc<Shared>,
    probe: Probe,
    pid: u32,
    workdir: PathBuf,
    env_pairs: Vec<(String, String)>,
    control_tx: mpsc::Sender<ControlSignal>,
    cancel: CancellationToken,
) {
    if let Some(delay) = probe.delay() {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
    }

    let threshold = probe.fail_threshold();
    let mut interval = tokio::time::interval(probe.interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }

        let healthy = probe_check::check(&probe).await;
        let fail_count = if healthy {
            shared.probe_fail_count.store(0, Ordering::SeqCst);
            0
        } else {
            shared.probe_fail_count.fetch_add(1, Ordering::SeqCst) + 1
        };

        let revision = shared.next_revision();
        let request = Request::ReportProbe(ReportProbeReq {
            service_id: shared.service_id.as_str().to_string(),
            event_time_ms: now_epoch_ms(),
            is_success: healthy,
            fail_count,
            pid,
            revision,
        });
        if let Err(err) = client::call(&shared.sock_file, &request).await {
            tracing::debug!(%err, "probe report failed");
        }

        // spec.md §4.E: after every `threshold`-th, 2*threshold-th, ...
        // consecutive failure, report restart, run the configured onFail
        // action (if any), then kill the child and re-enter start. The
        // child is always restarted once the threshold is hit; onFail.action
        // is an additional side-effecting script, not a choice of outcome.
        if !healthy && fail_count > 0 && fail_count % threshold == 0 {
            report_status(&shared, Status::Restart, None, None).await;
            if let Some(on_fail) = probe.on_fail() {
                run_on_fail_action(&workdir, &on_fail.action, &env_pairs).await;
            }
            let _ = control_tx.send(ControlSignal::Restart).await;
            return;
        }
    }
}

/// Runs `onFail.action` to completion before the child is killed, matching
/// `original_source/internal/app/service.go`'s blocking `reexec.ExecCommand`
/// call (the probe loop does not tick again until the action script exits).
async fn run_on_fail_action(workdir: &Path, action: &str, env_pairs: &[(String, String)]) {
    match zallet_process::spawn(
        workdir,
        action,
        env_pairs,
        Stdin::Null,
        Stdout::<tokio::io::Sink>::Inherit,
    )
    .await
    {
        Ok(handle) => {
            if let Err(err) = handle.wait().await {
                tracing::warn!(%err, action, "onFail action exited with an error");
            }
        }
        Err(err) => tracing::warn!(%err, action, "failed to spawn onFail action"),
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_counter_is_strictly_increasing() {
        let shared = Shared::new(ServiceId::generate_at(0, "20260101000000"), PathBuf::from("/tmp/x.sock"));
        assert_eq!(shared.next_revision(), 1);
        assert_eq!(shared.next_revision(), 2);
        assert_eq!(shared.next_revision(), 3);
    }

    #[test]
    fn resolve_workdir_prefers_spec_workdir_over_base_dir() {
        let mut opts = SupervisorOpts {
            service_id: ServiceId::generate_at(0, "20260101000000"),
            spec: zallet_core::ServiceSpec::test_builder().build(),
            base_dir: PathBuf::from("/var/lib/zallet"),
            sock_file: PathBuf::from("/var/lib/zallet/zallet.sock"),
            envs: Default::default(),
        };
        assert_eq!(resolve_workdir(&opts), PathBuf::from("/var/lib/zallet"));
        opts.spec.workdir = Some("/srv/app".to_string());
        assert_eq!(resolve_workdir(&opts), PathBuf::from("/srv/app"));
    }

    #[test]
    fn build_env_appends_opts_envs_after_spec_with_map() {
        let mut opts = SupervisorOpts {
            service_id: ServiceId::generate_at(0, "20260101000000"),
            spec: zallet_core::ServiceSpec::test_builder().build(),
            base_dir: PathBuf::from("/var/lib/zallet"),
            sock_file: PathBuf::from("/var/lib/zallet/zallet.sock"),
            envs: Default::default(),
        };
        opts.spec.with.insert("FOO".to_string(), "from_spec".to_string());
        opts.envs.insert("FOO".to_string(), "from_opts".to_string());
        let env = build_env(&opts);
        let foo = env.iter().rev().find(|(k, _)| k == "FOO").map(|(_, v)| v.as_str());
        assert_eq!(foo, Some("from_opts"));
    }
}
