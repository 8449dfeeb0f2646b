// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline tasks.
//!
//! A task turns the previous task's output (or the trigger payload) into a
//! new [`Value`], or asks the coordinator to put a transaction on chain.

mod http;
mod submit;
mod transform;

pub use http::HttpFetch;
pub use submit::SubmitTx;
pub use transform::{JsonParse, Multiply, Noop};

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{ScriptStep, ScriptedTask};

use async_trait::async_trait;
use orc_core::{ErrorKind, JobId, RunId, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Everything a task invocation sees
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub run_id: RunId,
    pub job_id: JobId,
    pub task_id: String,
    pub input: Value,
    pub params: serde_json::Map<String, serde_json::Value>,
    /// 1-based attempt number
    pub attempt: u32,
}

impl TaskContext {
    pub fn param(&self, name: &str) -> Option<&serde_json::Value> {
        self.params.get(name)
    }

    pub fn str_param(&self, name: &str) -> Result<&str, TaskError> {
        match self.params.get(name) {
            Some(serde_json::Value::String(s)) => Ok(s),
            Some(other) => Err(TaskError::validation(format!("param {name} must be a string, got {other}"))),
            None => Err(TaskError::validation(format!("missing param {name}"))),
        }
    }

    /// Numeric param; numeric strings are accepted
    pub fn number_param(&self, name: &str) -> Result<Option<f64>, TaskError> {
        let Some(raw) = self.params.get(name) else { return Ok(None) };
        Value::from(raw.clone())
            .to_number()
            .filter(|n| n.is_finite())
            .map(Some)
            .ok_or_else(|| TaskError::validation(format!("param {name} must be a number, got {raw}")))
    }

    pub fn bool_param(&self, name: &str) -> bool {
        self.params.get(name).and_then(serde_json::Value::as_bool).unwrap_or(false)
    }
}

/// Transaction a task wants broadcast. The coordinator fills in the nonce,
/// fee and sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRequest {
    pub to: String,
    #[serde(with = "orc_core::value::hex_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    Value(Value),
    /// The Run waits for this transaction to confirm
    Transaction(TxRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Transient, message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Validation, message: message.into() }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

#[async_trait]
pub trait Task: Send + Sync + 'static {
    async fn run(&self, ctx: TaskContext) -> Result<TaskOutput, TaskError>;
}

/// Task implementations by type name
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, Arc<dyn Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in task type
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("http_fetch", HttpFetch::new());
        registry.register("json_parse", JsonParse);
        registry.register("multiply", Multiply);
        registry.register("submit_tx", SubmitTx);
        registry.register("noop", Noop);
        registry
    }

    /// Register `task` under `kind`, replacing any previous registration
    pub fn register(&mut self, kind: impl Into<String>, task: impl Task) -> &mut Self {
        self.tasks.insert(kind.into(), Arc::new(task));
        self
    }

    pub fn get(&self, kind: &str) -> Result<Arc<dyn Task>, TaskError> {
        self.tasks
            .get(kind)
            .cloned()
            .ok_or_else(|| TaskError::validation(format!("unknown task type {kind:?}")))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.tasks.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry").field("kinds", &self.kinds()).finish()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
