// SPDX-License-Identifier: MIT

//! The workflow DAG runner (spec.md §4.C): dependency-ordered execution of
//! a validated [`JobGraphSpec`] with a bounded worker pool, per-job
//! cancellation and timeout, and sequential in-job step execution.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;

use zallet_core::{Job, JobGraphSpec, Step};
use zallet_process::{Stdin, Stdout};

use crate::callbacks::{ExecutorCallbacks, StepRef};
use crate::error::ExecutorError;

/// Options for one [`Executor::run`] call.
pub struct RunOpts {
    pub workdir: PathBuf,
    /// Merged into every step's environment; a step's own `with` overlays
    /// these on key collision (spec.md §4.C).
    pub args: HashMap<String, String>,
    pub callbacks: Arc<dyn ExecutorCallbacks>,
    /// Cooperative cancellation handle; callers can cancel the whole run
    /// from outside (spec.md §4.C `graph.Cancel`). A fresh token is used if
    /// none is supplied.
    pub cancel: CancellationToken,
    /// Epoch-millisecond clock hook so step/job `begin` timestamps are
    /// deterministic in tests.
    pub now_epoch_ms: Arc<dyn Fn() -> u64 + Send + Sync>,
}

impl RunOpts {
    pub fn new(workdir: impl Into<PathBuf>, callbacks: Arc<dyn ExecutorCallbacks>) -> Self {
        Self {
            workdir: workdir.into(),
            args: HashMap::new(),
            callbacks,
            cancel: CancellationToken::new(),
            now_epoch_ms: Arc::new(|| {
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0)
            }),
        }
    }
}

/// Default worker pool size and queue depth (spec.md §5).
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A shared worker pool. One `Executor` can serve many concurrent
/// `run` calls (e.g. several workflow tasks); capacity is shared across
/// all of them, matching spec.md §5's single executor-wide bound.
pub struct Executor {
    /// Gates how many jobs may be *admitted* (queued or running) across the
    /// whole executor at once; a job that can't acquire a permit the
    /// instant it becomes ready fails fast with `OutOfCapacity` rather than
    /// waiting (spec.md §4.C: "abort strategy", not queued indefinitely).
    admission: Arc<Semaphore>,
    /// Gates how many jobs may be *actively running* their steps at once.
    /// Unlike `admission`, waiting here is expected — this is the "bounded
    /// worker pool" itself.
    workers: Arc<Semaphore>,
}

impl Executor {
    pub fn new(max_concurrency: usize, queue_capacity: usize) -> Self {
        Self {
            admission: Arc::new(Semaphore::new(queue_capacity)),
            workers: Arc::new(Semaphore::new(max_concurrency)),
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY, DEFAULT_QUEUE_CAPACITY)
    }
}

/// One job's outcome, fanned out to every dependent via a `watch` channel.
#[derive(Clone)]
struct JobOutcome {
    error: Option<ExecutorError>,
}

impl Executor {
    /// Validates `graph` (spec.md §4.B) and runs it to completion,
    /// propagating the first job error encountered. Siblings that fail
    /// after the first cause still run their `JobAfter`/`StepAfter`
    /// callbacks and write their own artifacts; they just don't overwrite
    /// the aggregate's first cause (spec.md §4.C).
    pub async fn run(&self, graph: &JobGraphSpec, opts: RunOpts) -> Result<(), ExecutorError> {
        graph.validate_shape().map_err(|e| ExecutorError::Validation(e.to_string()))?;
        zallet_dag::validate(graph)?;

        let opts = Arc::new(opts);
        let mut senders: HashMap<String, watch::Sender<Option<JobOutcome>>> = HashMap::new();
        let mut receivers: HashMap<String, watch::Receiver<Option<JobOutcome>>> = HashMap::new();
        for name in graph.jobs.keys() {
            let (tx, rx) = watch::channel(None);
            senders.insert(name.clone(), tx);
            receivers.insert(name.clone(), rx);
        }

        // Overall task-level deadline, independent of any per-job timeout
        // (SPEC_FULL.md §3 supplemental `JobGraphSpec.timeout`).
        let task_cancel = opts.cancel.clone();
        let task_timeout_guard = graph.timeout.map(|deadline| {
            let task_cancel = task_cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(deadline) => task_cancel.cancel(),
                    _ = task_cancel.cancelled() => {}
                }
            })
        });

        let mut handles = Vec::with_capacity(graph.jobs.len());
        for (name, job) in &graph.jobs {
            let name = name.clone();
            let job = job.clone();
            let needs_rx: Vec<watch::Receiver<Option<JobOutcome>>> = job
                .needs
                .iter()
                .map(|need| receivers[need].clone())
                .collect();
            let Some(tx) = senders.remove(&name) else {
                continue;
            };
            let admission = self.admission.clone();
            let workers = self.workers.clone();
            let opts = opts.clone();
            let cancel = opts.cancel.clone();

            handles.push(tokio::spawn(async move {
                let outcome = run_one_job(
                    &name,
                    &job,
                    needs_rx,
                    admission,
                    workers,
                    &opts,
                    cancel,
                )
                .await;
                let _ = tx.send(Some(outcome.clone()));
                outcome
            }));
        }

        let mut first_error: Option<ExecutorError> = None;
        for handle in handles {
            let outcome = handle.await.map_err(|e| ExecutorError::Io(e.to_string().into()))?;
            if let Some(err) = outcome.error {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }

        task_cancel.cancel();
        if let Some(guard) = task_timeout_guard {
            guard.abort();
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn run_one_job(
    name: &str,
    job: &Job,
    needs: Vec<watch::Receiver<Option<JobOutcome>>>,
    admission: Arc<Semaphore>,
    workers: Arc<Semaphore>,
    opts: &RunOpts,
    cancel: CancellationToken,
) -> JobOutcome {
    // A job never starts before every dependency has produced a result
    // (spec.md §5); the first dependency failure short-circuits this job
    // without running any of its steps.
    for mut rx in needs {
        loop {
            if let Some(outcome) = rx.borrow().clone() {
                if let Some(err) = outcome.error {
                    return JobOutcome {
                        error: Some(ExecutorError::UpstreamFailed(err.to_string())),
                    };
                }
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    if cancel.is_cancelled() {
        return JobOutcome { error: Some(ExecutorError::Cancelled) };
    }

    let Ok(admission_permit) = admission.try_acquire_owned() else {
        return JobOutcome {
            error: Some(ExecutorError::OutOfCapacity(format!(
                "job {name:?}: executor queue is full"
            ))),
        };
    };

    opts.callbacks.job_before(name);
    let started = Instant::now();

    let job_cancel = cancel.child_token();
    // Distinguishes "this job's own timeout fired" from "cancelled for some
    // other reason" (an external `graph.Cancel`, or the task-level deadline
    // in `Executor::run`) — both trip the same `job_cancel` token, but spec.md
    // §8 scenario S5 requires the former to surface as `RunStatus::Timeout`
    // with cause `deadline-exceeded`, not `RunStatus::Cancelled`.
    let deadline_reason: Arc<Mutex<Option<Duration>>> = Arc::new(Mutex::new(None));
    let job_timeout_guard = job.timeout.map(|deadline| {
        let job_cancel = job_cancel.clone();
        let deadline_reason = deadline_reason.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(deadline) => {
                    *deadline_reason.lock().unwrap_or_else(|e| e.into_inner()) = Some(deadline);
                    job_cancel.cancel();
                }
                _ = job_cancel.cancelled() => {}
            }
        })
    });

    let worker_permit = workers.acquire_owned().await.ok();
    let result = run_job_steps(name, job, opts, &job_cancel, &deadline_reason).await;
    drop(worker_permit);
    drop(admission_permit);
    job_cancel.cancel();
    if let Some(guard) = job_timeout_guard {
        guard.abort();
    }

    let duration = started.elapsed();
    opts.callbacks.job_after(name, result.as_ref().err(), duration);
    JobOutcome { error: result.err() }
}

async fn run_job_steps(
    job_name: &str,
    job: &Job,
    opts: &RunOpts,
    job_cancel: &CancellationToken,
    deadline_reason: &Mutex<Option<Duration>>,
) -> Result<(), ExecutorError> {
    for (index, step) in job.steps.iter().enumerate() {
        let step_ref = StepRef { job_name, step_index: index };
        let begin_epoch_ms = (opts.now_epoch_ms)();
        let started = Instant::now();

        if job_cancel.is_cancelled() {
            let err = cancellation_error(deadline_reason);
            opts.callbacks.step_after(step_ref, Some(&err), begin_epoch_ms, started.elapsed());
            return Err(err);
        }

        let mut merged_with: HashMap<String, String> = opts.args.clone();
        merged_with.extend(step.with.iter().map(|(k, v)| (k.clone(), v.clone())));
        let merged_step = Step {
            name: step.name.clone(),
            with: merged_with.clone(),
            script: step.script.clone(),
        };
        let script = merged_step.interpolated_script();
        let env_pairs: Vec<(String, String)> = merged_with.into_iter().collect();

        let sink = opts.callbacks.step_output_sink(step_ref);
        let step_result =
            run_step_script(&opts.workdir, &script, &env_pairs, sink, job_cancel, deadline_reason)
                .await;

        let duration = started.elapsed();
        opts.callbacks.step_after(step_ref, step_result.as_ref().err(), begin_epoch_ms, duration);
        step_result?;
    }
    Ok(())
}

/// Resolves a tripped `job_cancel` token into the right public error: a
/// job-timeout guard stamps `deadline_reason` just before it cancels, so its
/// presence distinguishes a deadline from any other cancellation.
fn cancellation_error(deadline_reason: &Mutex<Option<Duration>>) -> ExecutorError {
    match *deadline_reason.lock().unwrap_or_else(|e| e.into_inner()) {
        Some(deadline) => ExecutorError::DeadlineExceeded(deadline),
        None => ExecutorError::Cancelled,
    }
}

async fn run_step_script(
    workdir: &std::path::Path,
    script: &str,
    env: &[(String, String)],
    sink: std::pin::Pin<Box<dyn tokio::io::AsyncWrite + Send + Unpin>>,
    job_cancel: &CancellationToken,
    deadline_reason: &Mutex<Option<Duration>>,
) -> Result<(), ExecutorError> {
    let handle = zallet_process::spawn(workdir, script, env, Stdin::Null, Stdout::Writer(sink))
        .await
        .map_err(ExecutorError::from)?;

    tokio::select! {
        result = handle.wait() => result.map_err(ExecutorError::from),
        _ = job_cancel.cancelled() => {
            let _ = handle.kill().await;
            let _ = handle.wait().await;
            Err(cancellation_error(deadline_reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use parking_lot::Mutex;

    struct RecordingCallbacks {
        job_events: Mutex<Vec<(String, bool)>>,
        step_events: Mutex<Vec<(String, usize, bool)>>,
    }

    impl RecordingCallbacks {
        fn new() -> Self {
            Self { job_events: Mutex::new(Vec::new()), step_events: Mutex::new(Vec::new()) }
        }
    }

    impl ExecutorCallbacks for RecordingCallbacks {
        fn job_after(&self, job_name: &str, err: Option<&ExecutorError>, _duration: Duration) {
            self.job_events.lock().push((job_name.to_string(), err.is_none()));
        }

        fn step_output_sink(
            &self,
            _step: StepRef<'_>,
        ) -> std::pin::Pin<Box<dyn tokio::io::AsyncWrite + Send + Unpin>> {
            Box::pin(tokio::io::sink())
        }

        fn step_after(
            &self,
            step: StepRef<'_>,
            err: Option<&ExecutorError>,
            _begin_epoch_ms: u64,
            _duration: Duration,
        ) {
            self.step_events.lock().push((
                step.job_name.to_string(),
                step.step_index,
                err.is_none(),
            ));
        }
    }

    fn step(script: &str) -> Step {
        Step { name: "s".into(), with: HashMap::new(), script: script.into() }
    }

    fn job(needs: &[&str], steps: Vec<Step>) -> Job {
        Job { needs: needs.iter().map(|s| s.to_string()).collect(), steps, timeout: None }
    }

    #[tokio::test]
    async fn runs_diamond_graph_respecting_dependency_order() {
        let mut jobs = IndexMap::new();
        jobs.insert("x".to_string(), job(&[], vec![step("true")]));
        jobs.insert("y".to_string(), job(&["x"], vec![step("true")]));
        let graph = JobGraphSpec { jobs, timeout: None };

        let dir = tempfile::tempdir().expect("tempdir");
        let callbacks = Arc::new(RecordingCallbacks::new());
        let executor = Executor::new(10, 1024);
        let opts = RunOpts::new(dir.path(), callbacks.clone());
        executor.run(&graph, opts).await.expect("run succeeds");

        let events = callbacks.job_events.lock();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|(_, ok)| *ok));
    }

    #[tokio::test]
    async fn first_job_failure_propagates_but_siblings_still_report() {
        let mut jobs = IndexMap::new();
        jobs.insert("a".to_string(), job(&[], vec![step("false")]));
        jobs.insert("b".to_string(), job(&[], vec![step("true")]));
        let graph = JobGraphSpec { jobs, timeout: None };

        let dir = tempfile::tempdir().expect("tempdir");
        let callbacks = Arc::new(RecordingCallbacks::new());
        let executor = Executor::new(10, 1024);
        let opts = RunOpts::new(dir.path(), callbacks.clone());
        let result = executor.run(&graph, opts).await;
        assert!(result.is_err());

        let events = callbacks.job_events.lock();
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|(name, ok)| name == "a" && !ok));
        assert!(events.iter().any(|(name, ok)| name == "b" && *ok));
    }

    #[tokio::test]
    async fn dependent_job_is_skipped_when_upstream_fails() {
        let mut jobs = IndexMap::new();
        jobs.insert("a".to_string(), job(&[], vec![step("false")]));
        jobs.insert("b".to_string(), job(&["a"], vec![step("true")]));
        let graph = JobGraphSpec { jobs, timeout: None };

        let dir = tempfile::tempdir().expect("tempdir");
        let callbacks = Arc::new(RecordingCallbacks::new());
        let executor = Executor::new(10, 1024);
        let opts = RunOpts::new(dir.path(), callbacks.clone());
        let result = executor.run(&graph, opts).await;
        assert!(result.is_err());

        let step_events = callbacks.step_events.lock();
        assert!(
            step_events.iter().all(|(name, _, _)| name != "b"),
            "b's step should never have run"
        );
    }

    #[tokio::test]
    async fn job_timeout_cancels_long_running_step() {
        let mut jobs = IndexMap::new();
        jobs.insert(
            "slow".to_string(),
            Job {
                needs: vec![],
                steps: vec![step("sleep 5")],
                timeout: Some(Duration::from_millis(100)),
            },
        );
        let graph = JobGraphSpec { jobs, timeout: None };

        let dir = tempfile::tempdir().expect("tempdir");
        let callbacks = Arc::new(RecordingCallbacks::new());
        let executor = Executor::new(10, 1024);
        let opts = RunOpts::new(dir.path(), callbacks.clone());
        let started = Instant::now();
        let result = executor.run(&graph, opts).await;
        assert!(matches!(result, Err(ExecutorError::DeadlineExceeded(_))));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn executor_aborts_fast_when_queue_capacity_is_exhausted() {
        let mut jobs = IndexMap::new();
        jobs.insert("only".to_string(), job(&[], vec![step("true")]));
        let graph = JobGraphSpec { jobs, timeout: None };

        let dir = tempfile::tempdir().expect("tempdir");
        let callbacks = Arc::new(RecordingCallbacks::new());
        // Queue capacity of zero: the single job can never be admitted.
        let executor = Executor::new(10, 0);
        let opts = RunOpts::new(dir.path(), callbacks);
        let result = executor.run(&graph, opts).await;
        assert!(matches!(result, Err(ExecutorError::OutOfCapacity(_))));
    }
}
