// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task Pipeline Executor.
//!
//! Runs are driven by a bounded pool of workers. A Run is owned by at most
//! one worker at a time; asking to execute a Run that is already being
//! driven only schedules another pass once the current one finishes.
//! A Run parked on a transaction releases its worker.

use crate::backoff;
use crate::config::ExecutorConfig;
use crate::error::EngineError;
use crate::runs::RunMachine;
use orc_adapters::{TaskContext, TaskError, TaskOutput, TaskRegistry, TxRequest};
use orc_core::{
    format_duration, Clock, JobSpec, Run, RunError, RunId, RunStatus, TaskRun, TaskSpec,
    TxId, Value,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A transaction handed from a task to the coordinator
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub tx_id: TxId,
    pub run_id: RunId,
    pub task_id: String,
    pub request: TxRequest,
}

/// Persisted form of a transaction request on its pending TaskRun
pub(crate) fn request_to_value(request: &TxRequest) -> Value {
    Value::Map(BTreeMap::from([
        ("to".to_string(), Value::Text(request.to.clone())),
        ("data".to_string(), Value::Bytes(request.data.clone())),
    ]))
}

pub(crate) fn request_from_value(value: &Value) -> Option<TxRequest> {
    let to = value.get("to")?.as_text()?.to_string();
    let Value::Bytes(data) = value.get("data")? else { return None };
    Some(TxRequest { to, data: data.clone() })
}

/// What a single pipeline step left behind
enum Step {
    /// Re-read the Run and keep going
    Next,
    Stop(RunStatus),
}

struct Inner<K: Clock> {
    runs: RunMachine<K>,
    registry: TaskRegistry,
    permits: Arc<Semaphore>,
    workers: usize,
    /// Runs owned by a worker; the flag asks for another pass
    active: Mutex<HashMap<RunId, bool>>,
    submissions: mpsc::Sender<Submission>,
    shutdown: CancellationToken,
}

#[derive(Clone)]
pub struct Executor<K: Clock> {
    inner: Arc<Inner<K>>,
}

impl<K: Clock> Executor<K> {
    pub fn new(
        runs: RunMachine<K>,
        registry: TaskRegistry,
        config: &ExecutorConfig,
        submissions: mpsc::Sender<Submission>,
        shutdown: CancellationToken,
    ) -> Self {
        let workers = config.workers.max(1);
        Self {
            inner: Arc::new(Inner {
                runs,
                registry,
                permits: Arc::new(Semaphore::new(workers)),
                workers,
                active: Mutex::new(HashMap::new()),
                submissions,
                shutdown,
            }),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    /// Schedule `run_id` on the worker pool. Refused while the store is
    /// unavailable so no new work starts that could not be recorded.
    pub fn execute(&self, run_id: &RunId) -> Result<(), EngineError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(EngineError::Shutdown);
        }
        if !self.inner.runs.store().is_available() {
            return Err(EngineError::Backpressure);
        }
        {
            let mut active = self.inner.active.lock();
            if let Some(again) = active.get_mut(run_id) {
                *again = true;
                return Ok(());
            }
            active.insert(run_id.clone(), false);
        }
        let this = self.clone();
        let id = run_id.clone();
        tokio::spawn(async move { this.work(id).await });
        Ok(())
    }

    /// Number of Runs currently owned by a worker or waiting for one
    pub fn active_count(&self) -> usize {
        self.inner.active.lock().len()
    }

    /// Wait until every worker is idle
    pub async fn idle(&self) {
        let workers = u32::try_from(self.inner.workers).unwrap_or(u32::MAX);
        if let Ok(all) = self.inner.permits.acquire_many(workers).await {
            drop(all);
        }
    }

    async fn work(self, id: RunId) {
        let permit = self.inner.permits.clone().acquire_owned().await;
        loop {
            if permit.is_err() || self.inner.shutdown.is_cancelled() {
                break;
            }
            match self.drive(&id).await {
                Ok(status) => debug!(run = %id, %status, "pipeline pass finished"),
                Err(EngineError::Shutdown) => break,
                Err(e) => warn!(run = %id, error = %e, "pipeline pass failed"),
            }
            {
                let mut active = self.inner.active.lock();
                match active.get_mut(&id) {
                    Some(again) if *again => *again = false,
                    _ => {
                        active.remove(&id);
                        return;
                    }
                }
            }
        }
        self.inner.active.lock().remove(&id);
    }

    /// Drive a Run's tasks until it completes, fails, parks on a
    /// transaction or is cancelled. Returns the status it stopped in.
    pub async fn drive(&self, id: &RunId) -> Result<RunStatus, EngineError> {
        let store = self.inner.runs.store();
        loop {
            let run = store.run(id).ok_or_else(|| EngineError::UnknownRun(id.clone()))?;
            let job = store.job(&run.job_id).ok_or_else(|| EngineError::UnknownJob(run.job_id.clone()))?;
            match run.status {
                RunStatus::Unstarted => {
                    if let Err(e) = self.inner.runs.start(id) {
                        if !is_conflict(&e) {
                            return Err(e);
                        }
                    }
                    continue;
                }
                RunStatus::InProgress => {}
                other => return Ok(other),
            }
            // An errored TaskRun whose Run never moved to Errored
            if let Some(cause) = run.task_runs.last().and_then(|tr| tr.error.clone()) {
                match self.fail(id, cause)? {
                    Step::Next => continue,
                    Step::Stop(status) => return Ok(status),
                }
            }
            let index = run.task_runs.len();
            let Some(spec) = job.tasks.get(index) else {
                warn!(run = %id, index, "run in progress with no task left");
                return Ok(run.status);
            };
            match self.step(&run, &job, index, spec).await? {
                Step::Next => {}
                Step::Stop(status) => return Ok(status),
            }
        }
    }

    async fn step(&self, run: &Run, job: &JobSpec, index: usize, spec: &TaskSpec) -> Result<Step, EngineError> {
        let runs = &self.inner.runs;
        let input = run.latest_output().clone();
        let started = runs.now_ms();

        let task = match self.inner.registry.get(&spec.kind) {
            Ok(task) => task,
            Err(e) => return self.record_failure(run, job, index, spec, input, e, 1, started),
        };

        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            let ctx = TaskContext {
                run_id: run.id.clone(),
                job_id: job.id.clone(),
                task_id: spec.id.clone(),
                input: input.clone(),
                params: spec.params.clone(),
                attempt,
            };
            debug!(run = %run.id, task = %spec.id, attempt, "invoking task");
            let outcome = tokio::select! {
                _ = self.inner.shutdown.cancelled() => return Err(EngineError::Shutdown),
                r = tokio::time::timeout(spec.timeout, task.run(ctx)) => r,
            };
            let outcome = outcome.unwrap_or_else(|_| {
                Err(TaskError::transient(format!("timed out after {}", format_duration(spec.timeout))))
            });
            match outcome {
                Ok(output) => break Ok(output),
                Err(e) if e.is_retryable() && attempt < spec.retry.attempts => {
                    let delay = backoff::task_delay(&spec.retry, attempt);
                    info!(run = %run.id, task = %spec.id, attempt, ?delay, error = %e, "task failed, retrying");
                    tokio::select! {
                        _ = self.inner.shutdown.cancelled() => return Err(EngineError::Shutdown),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    let live = runs.store().run(&run.id).map(|r| r.status);
                    if live != Some(RunStatus::InProgress) {
                        return Ok(Step::Next);
                    }
                }
                Err(e) => break Err(e),
            }
        };

        let output = match result {
            Ok(output) => output,
            Err(e) => return self.record_failure(run, job, index, spec, input, e, attempt, started),
        };
        let finished = runs.now_ms();
        match output {
            TaskOutput::Value(value) => {
                let task_run = TaskRun::completed(&spec.id, input, value)
                    .with_attempts(attempt)
                    .with_times(started, finished);
                self.advance(job, &run.id, index, task_run)
            }
            TaskOutput::Transaction(request) => {
                let tx_id = runs.store().tx_for_task(&run.id, &spec.id).map(|tx| tx.id).unwrap_or_default();
                let mut task_run = TaskRun::pending(&spec.id, input, tx_id.clone())
                    .with_attempts(attempt)
                    .with_times(started, 0);
                task_run.output = request_to_value(&request);
                let step = self.advance(job, &run.id, index, task_run)?;
                if matches!(step, Step::Stop(RunStatus::PendingConfirmation)) {
                    info!(run = %run.id, task = %spec.id, tx = %tx_id, "run waiting on transaction");
                    let submission =
                        Submission { tx_id, run_id: run.id.clone(), task_id: spec.id.clone(), request };
                    self.inner.submissions.send(submission).await.map_err(|_| EngineError::Shutdown)?;
                }
                Ok(step)
            }
        }
    }

    fn advance(&self, job: &JobSpec, id: &RunId, index: usize, task_run: TaskRun) -> Result<Step, EngineError> {
        match self.inner.runs.advance(job, id, index, task_run) {
            Ok(run) if run.status == RunStatus::InProgress => Ok(Step::Next),
            Ok(run) => Ok(Step::Stop(run.status)),
            Err(e) if is_conflict(&e) => {
                debug!(run = %id, index, error = %e, "lost race recording task run");
                Ok(Step::Next)
            }
            Err(e) => Err(e),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record_failure(
        &self,
        run: &Run,
        job: &JobSpec,
        index: usize,
        spec: &TaskSpec,
        input: Value,
        error: TaskError,
        attempts: u32,
        started: u64,
    ) -> Result<Step, EngineError> {
        let runs = &self.inner.runs;
        let cause = RunError::new(error.kind, error.message).in_task(&spec.id);
        let task_run = TaskRun::errored(&spec.id, input, cause.clone())
            .with_attempts(attempts)
            .with_times(started, runs.now_ms());
        match runs.advance(job, &run.id, index, task_run) {
            Ok(_) => {}
            Err(e) if is_conflict(&e) => return Ok(Step::Next),
            Err(e) => return Err(e),
        }
        self.fail(&run.id, cause)
    }

    fn fail(&self, id: &RunId, cause: RunError) -> Result<Step, EngineError> {
        match self.inner.runs.fail(id, cause) {
            Ok(run) => Ok(Step::Stop(run.status)),
            Err(e) if is_conflict(&e) => Ok(Step::Next),
            Err(e) => Err(e),
        }
    }
}

fn is_conflict(e: &EngineError) -> bool {
    matches!(e, EngineError::Store(s) if s.is_conflict())
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
