// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job definitions: a trigger plus an ordered list of tasks

use crate::duration::{serde_opt, serde_str};
use crate::threshold::TriggerFns;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

crate::define_id! {
    /// Identifier of a Job. Usually chosen by the operator in the job file.
    pub struct JobId("job-");
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobSpecError {
    #[error("job {0} has no tasks")]
    NoTasks(JobId),
    #[error("job {job} declares task id {task} twice")]
    DuplicateTask { job: JobId, task: String },
    #[error("job {job}: {message}")]
    Invalid { job: JobId, message: String },
}

/// What starts a Run of a Job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSpec {
    /// A contract log matching the address and topics
    Log {
        address: String,
        #[serde(default)]
        topics: Vec<String>,
    },
    /// A fixed-period tick
    Interval {
        #[serde(with = "serde_str")]
        every: Duration,
    },
    /// An external request submitted through the node API
    Web,
    /// An observed value that moved far enough from the last reported one.
    /// `every` is an optional heartbeat that forces a Run when nothing has
    /// triggered for that long.
    Deviation {
        functions: TriggerFns,
        #[serde(default, with = "serde_opt", skip_serializing_if = "Option::is_none")]
        every: Option<Duration>,
    },
}

impl TriggerSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            TriggerSpec::Log { .. } => "log",
            TriggerSpec::Interval { .. } => "interval",
            TriggerSpec::Web => "web",
            TriggerSpec::Deviation { .. } => "deviation",
        }
    }
}

/// Bounded retry with exponential backoff and jitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub attempts: u32,
    #[serde(with = "serde_str")]
    pub initial_backoff: Duration,
    #[serde(with = "serde_str")]
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Fraction of the delay randomized in either direction (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self { attempts: 1, ..Self::default() }
    }

    /// Un-jittered delay before retry number `retry` (1-based)
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exp = self.multiplier.max(1.0).powi(retry.saturating_sub(1) as i32);
        let secs = self.initial_backoff.as_secs_f64() * exp;
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

/// One step of a Job's pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    #[serde(default = "default_timeout", with = "serde_str")]
    pub timeout: Duration,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Required confirmation depth for a transaction emitted by this task.
    /// Falls back to the node default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            params: serde_json::Map::new(),
            timeout: default_timeout(),
            retry: RetryPolicy::default(),
            confirmations: None,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    crate::setters! {
        set {
            timeout: Duration,
            retry: RetryPolicy,
        }
        option {
            confirmations: u64,
        }
    }
}

/// A Job definition. Read-only to the engine once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: JobId,
    #[serde(default)]
    pub name: String,
    pub trigger: TriggerSpec,
    pub tasks: Vec<TaskSpec>,
}

impl JobSpec {
    pub fn new(id: impl Into<JobId>, trigger: TriggerSpec, tasks: Vec<TaskSpec>) -> Self {
        Self { id: id.into(), name: String::new(), trigger, tasks }
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    /// Position of a task in the pipeline
    pub fn task_index(&self, task_id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == task_id)
    }

    /// Structural checks that do not depend on which task types exist
    pub fn validate(&self) -> Result<(), JobSpecError> {
        if self.tasks.is_empty() {
            return Err(JobSpecError::NoTasks(self.id.clone()));
        }
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(JobSpecError::DuplicateTask {
                    job: self.id.clone(),
                    task: task.id.clone(),
                });
            }
            if task.retry.attempts == 0 {
                return Err(self.invalid(format!("task {} must allow at least one attempt", task.id)));
            }
            if task.timeout.is_zero() {
                return Err(self.invalid(format!("task {} has a zero timeout", task.id)));
            }
            let retry = &task.retry;
            if !(0.0..=1.0).contains(&retry.jitter) {
                return Err(self.invalid(format!("task {} jitter must be within 0..=1", task.id)));
            }
            if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
                return Err(self.invalid(format!("task {} backoff multiplier must be a finite number >= 1", task.id)));
            }
        }
        match &self.trigger {
            TriggerSpec::Log { address, .. } if address.trim().is_empty() => {
                Err(self.invalid("log trigger needs an address"))
            }
            TriggerSpec::Interval { every } if every.is_zero() => {
                Err(self.invalid("interval trigger needs a non-zero period"))
            }
            TriggerSpec::Deviation { functions, .. } if functions.is_empty() => {
                Err(self.invalid("deviation trigger needs at least one function"))
            }
            TriggerSpec::Deviation { every: Some(every), .. } if every.is_zero() => {
                Err(self.invalid("deviation heartbeat must be non-zero"))
            }
            _ => Ok(()),
        }
    }

    fn invalid(&self, message: impl Into<String>) -> JobSpecError {
        JobSpecError::Invalid { job: self.id.clone(), message: message.into() }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
