// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runs and their task executions

use crate::error::RunError;
use crate::head::TxHash;
use crate::job::JobId;
use crate::tx::TxId;
use crate::value::Value;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifier of a single Run of a Job
    pub struct RunId("run-");
}

/// Lifecycle of a Run.
///
/// `Unstarted → InProgress → PendingConfirmation → Completed`, with
/// `PendingConfirmation → InProgress` when tasks remain after the confirmed
/// transaction. Any non-terminal state may move to `Errored` or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Unstarted,
    InProgress,
    PendingConfirmation,
    Completed,
    Errored,
    Cancelled,
}

crate::simple_display! {
    RunStatus {
        Unstarted => "unstarted",
        InProgress => "in_progress",
        PendingConfirmation => "pending_confirmation",
        Completed => "completed",
        Errored => "errored",
        Cancelled => "cancelled",
    }
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Errored | RunStatus::Cancelled)
    }

    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        match (self, next) {
            (from, Errored | Cancelled) => !from.is_terminal(),
            (Unstarted, InProgress) => true,
            (InProgress, PendingConfirmation | Completed) => true,
            (PendingConfirmation, Completed | InProgress) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRunStatus {
    /// Waiting on an external confirmation (transaction depth)
    Pending,
    Completed,
    Errored,
}

crate::simple_display! {
    TaskRunStatus {
        Pending => "pending",
        Completed => "completed",
        Errored => "errored",
    }
}

/// Reference from a TaskRun to the transaction that satisfied it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedTx {
    pub tx_id: TxId,
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// One recorded execution of a task within a Run. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub task_id: String,
    pub status: TaskRunStatus,
    /// Attempts consumed, including the successful one
    pub attempts: u32,
    pub input: Value,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_tx: Option<TxId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_tx: Option<ConfirmedTx>,
    pub started_at_ms: u64,
    #[serde(default)]
    pub finished_at_ms: u64,
}

impl TaskRun {
    pub fn completed(task_id: impl Into<String>, input: Value, output: Value) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskRunStatus::Completed,
            attempts: 1,
            input,
            output,
            error: None,
            pending_tx: None,
            confirmed_tx: None,
            started_at_ms: 0,
            finished_at_ms: 0,
        }
    }

    pub fn errored(task_id: impl Into<String>, input: Value, error: RunError) -> Self {
        Self {
            status: TaskRunStatus::Errored,
            error: Some(error),
            ..Self::completed(task_id, input, Value::Null)
        }
    }

    /// A TaskRun parked on a transaction awaiting confirmation
    pub fn pending(task_id: impl Into<String>, input: Value, tx_id: TxId) -> Self {
        Self {
            status: TaskRunStatus::Pending,
            pending_tx: Some(tx_id),
            ..Self::completed(task_id, input, Value::Null)
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_times(mut self, started_at_ms: u64, finished_at_ms: u64) -> Self {
        self.started_at_ms = started_at_ms;
        self.finished_at_ms = finished_at_ms;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub job_id: JobId,
    pub status: RunStatus,
    pub idempotency_key: String,
    /// Payload from the trigger, the first task's input
    pub trigger: Value,
    #[serde(default)]
    pub task_runs: Vec<TaskRun>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}

impl Run {
    pub fn new(
        id: RunId,
        job_id: JobId,
        idempotency_key: impl Into<String>,
        trigger: Value,
        created_at_ms: u64,
    ) -> Self {
        Self {
            id,
            job_id,
            status: RunStatus::Unstarted,
            idempotency_key: idempotency_key.into(),
            trigger,
            task_runs: Vec::new(),
            created_at_ms,
            finished_at_ms: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Latest TaskRun recorded for `task_id`
    pub fn latest_task_run(&self, task_id: &str) -> Option<&TaskRun> {
        self.task_runs.iter().rev().find(|tr| tr.task_id == task_id)
    }

    /// True if the latest TaskRun for `task_id` completed
    pub fn is_task_completed(&self, task_id: &str) -> bool {
        self.latest_task_run(task_id).is_some_and(|tr| tr.status == TaskRunStatus::Completed)
    }

    /// The parked TaskRun, if the Run is waiting on a transaction
    pub fn pending_task_run(&self) -> Option<&TaskRun> {
        self.task_runs.last().filter(|tr| tr.status == TaskRunStatus::Pending)
    }

    /// Output exposed to the next task: the most recent completed TaskRun,
    /// falling back to the trigger payload.
    pub fn latest_output(&self) -> &Value {
        self.task_runs
            .iter()
            .rev()
            .find(|tr| tr.status == TaskRunStatus::Completed)
            .map(|tr| &tr.output)
            .unwrap_or(&self.trigger)
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
