// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job Run state machine.
//!
//! Every method is a single compare-and-swap against the store: the caller
//! names the state it believes the Run is in, and a stale belief comes back
//! as a conflict instead of a lost update.

use crate::error::EngineError;
use orc_core::{
    Clock, ConfirmedTx, JobId, JobSpec, Run, RunError, RunId, RunStatus, TaskRun, TaskRunStatus,
    TriggerEvent, TriggerSpec, Value,
};
use orc_storage::{CreateRun, Store};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct RunMachine<K: Clock> {
    store: Store,
    clock: K,
}

impl<K: Clock> RunMachine<K> {
    pub fn new(store: Store, clock: K) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Create a Run for a trigger occurrence, or return the Run that already
    /// holds its idempotency key
    pub fn create_run(&self, job_id: &JobId, trigger: &TriggerEvent) -> Result<CreateRun, EngineError> {
        let job = self.store.job(job_id).ok_or_else(|| EngineError::UnknownJob(job_id.clone()))?;
        check_trigger(&job, trigger)?;
        let key = trigger.key();
        let created = self.store.create_run(RunId::new(), job_id, &key, trigger.payload(), self.now_ms())?;
        match &created {
            CreateRun::Created(run) => info!(run = %run.id, job = %job_id, %key, "run created"),
            CreateRun::Existing(run) => debug!(run = %run.id, %key, "trigger already has a run"),
        }
        Ok(created)
    }

    /// `Unstarted → InProgress`
    pub fn start(&self, id: &RunId) -> Result<Run, EngineError> {
        let run = self.store.transition(id, RunStatus::Unstarted, RunStatus::InProgress, self.now_ms())?;
        debug!(run = %id, "run started");
        Ok(run)
    }

    /// Record the outcome of task `index` of an in-progress Run.
    ///
    /// A completed last task completes the Run; a pending TaskRun parks it on
    /// its transaction.
    pub fn advance(&self, job: &JobSpec, id: &RunId, index: usize, task_run: TaskRun) -> Result<Run, EngineError> {
        let next = match task_run.status {
            TaskRunStatus::Pending => Some(RunStatus::PendingConfirmation),
            TaskRunStatus::Completed if index + 1 >= job.tasks.len() => Some(RunStatus::Completed),
            _ => None,
        };
        let run = self.store.append_task_run(id, RunStatus::InProgress, index, task_run, next, self.now_ms())?;
        if run.status == RunStatus::Completed {
            info!(run = %id, job = %job.id, "run completed");
        }
        Ok(run)
    }

    /// Complete the parked task with its confirmed transaction. The Run
    /// completes if that was the last task and returns to `InProgress`
    /// otherwise.
    pub fn confirm(
        &self,
        job: &JobSpec,
        id: &RunId,
        task_id: &str,
        output: Value,
        tx: ConfirmedTx,
    ) -> Result<Run, EngineError> {
        let is_last = job.task_index(task_id).is_some_and(|i| i + 1 >= job.tasks.len());
        let next = if is_last { RunStatus::Completed } else { RunStatus::InProgress };
        let run = self.store.confirm_task(id, task_id, output, tx, next, self.now_ms())?;
        info!(run = %id, task = task_id, status = %run.status, "transaction confirmed for run");
        Ok(run)
    }

    /// Move a non-terminal Run to `Errored`
    pub fn fail(&self, id: &RunId, error: RunError) -> Result<Run, EngineError> {
        warn!(run = %id, kind = %error.kind, task = error.task_id.as_deref(), message = %error.message, "run errored");
        Ok(self.store.fail_run(id, error, self.now_ms())?)
    }

    pub fn cancel(&self, id: &RunId) -> Result<Run, EngineError> {
        let run = self.store.cancel_run(id, self.now_ms())?;
        info!(run = %id, "run cancelled");
        Ok(run)
    }
}

fn check_trigger(job: &JobSpec, trigger: &TriggerEvent) -> Result<(), EngineError> {
    let ok = matches!(
        (&job.trigger, trigger),
        (TriggerSpec::Log { .. }, TriggerEvent::Log { .. })
            | (TriggerSpec::Interval { .. }, TriggerEvent::Tick { .. })
            | (TriggerSpec::Web, TriggerEvent::Web { .. })
            | (TriggerSpec::Deviation { .. }, TriggerEvent::Deviation { .. })
    );
    if ok {
        Ok(())
    } else {
        Err(EngineError::TriggerMismatch { job: job.id.clone(), got: trigger_kind(trigger) })
    }
}

fn trigger_kind(trigger: &TriggerEvent) -> &'static str {
    match trigger {
        TriggerEvent::Log { .. } => "log",
        TriggerEvent::Tick { .. } => "interval",
        TriggerEvent::Web { .. } => "web",
        TriggerEvent::Deviation { .. } => "deviation",
    }
}

#[cfg(test)]
#[path = "runs_tests.rs"]
mod tests;
