// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted task for tests

use super::{Task, TaskContext, TaskError, TaskOutput, TxRequest};
use async_trait::async_trait;
use orc_core::{RunId, Value};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// One scripted invocation result
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Return the input unchanged
    Echo,
    Value(Value),
    Fail(TaskError),
    Transaction(TxRequest),
    /// Sleep, then echo
    Sleep(Duration),
    /// Never return
    Hang,
}

#[derive(Default)]
struct ScriptState {
    steps: Vec<ScriptStep>,
    calls: Vec<TaskContext>,
    in_flight: usize,
    max_in_flight: usize,
    running_runs: HashSet<RunId>,
    same_run_overlap: bool,
}

/// Task that replays `steps` in order; the last step repeats
#[derive(Clone, Default)]
pub struct ScriptedTask {
    inner: Arc<Mutex<ScriptState>>,
}

impl ScriptedTask {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self { inner: Arc::new(Mutex::new(ScriptState { steps, ..Default::default() })) }
    }

    pub fn echo() -> Self {
        Self::new(vec![ScriptStep::Echo])
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Self::new(vec![ScriptStep::Value(value.into())])
    }

    /// Fail transiently `n` times, then echo
    pub fn flaky(n: usize) -> Self {
        let mut steps = vec![ScriptStep::Fail(TaskError::transient("flaky")); n];
        steps.push(ScriptStep::Echo);
        Self::new(steps)
    }

    pub fn calls(&self) -> Vec<TaskContext> {
        self.inner.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.lock().calls.len()
    }

    /// Highest number of concurrent invocations observed
    pub fn max_in_flight(&self) -> usize {
        self.inner.lock().max_in_flight
    }

    /// True if two invocations for the same Run ever overlapped
    pub fn same_run_overlap(&self) -> bool {
        self.inner.lock().same_run_overlap
    }

    fn begin(&self, ctx: &TaskContext) -> ScriptStep {
        let mut state = self.inner.lock();
        let index = state.calls.len().min(state.steps.len().saturating_sub(1));
        let step = state.steps.get(index).cloned().unwrap_or(ScriptStep::Echo);
        state.calls.push(ctx.clone());
        state.in_flight += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight);
        if !state.running_runs.insert(ctx.run_id.clone()) {
            state.same_run_overlap = true;
        }
        step
    }

    fn end(&self, run_id: &RunId) {
        let mut state = self.inner.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.running_runs.remove(run_id);
    }
}

#[async_trait]
impl Task for ScriptedTask {
    async fn run(&self, ctx: TaskContext) -> Result<TaskOutput, TaskError> {
        let step = self.begin(&ctx);
        let _guard = EndGuard { task: self, run_id: ctx.run_id.clone() };
        match step {
            ScriptStep::Echo => Ok(TaskOutput::Value(ctx.input)),
            ScriptStep::Value(v) => Ok(TaskOutput::Value(v)),
            ScriptStep::Fail(e) => Err(e),
            ScriptStep::Transaction(tx) => Ok(TaskOutput::Transaction(tx)),
            ScriptStep::Sleep(d) => {
                tokio::time::sleep(d).await;
                Ok(TaskOutput::Value(ctx.input))
            }
            ScriptStep::Hang => std::future::pending().await,
        }
    }
}

/// Decrements in-flight bookkeeping even when the invocation is dropped by a
/// timeout
struct EndGuard<'a> {
    task: &'a ScriptedTask,
    run_id: RunId,
}

impl Drop for EndGuard<'_> {
    fn drop(&mut self) {
        self.task.end(&self.run_id);
    }
}
