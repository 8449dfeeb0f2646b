// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger sources owned by the engine: interval tickers, log listeners and
//! the deviation gate. Web triggers arrive from outside through
//! [`crate::Node`].

use crate::config::LogConfig;
use crate::error::EngineError;
use crate::head_tracker::TrackerHandle;
use crate::pipeline::Executor;
use crate::runs::RunMachine;
use orc_adapters::{ChainClient, Log, LogFilter};
use orc_core::{Clock, JobId, JobSpec, RunStatus, TriggerEvent, TriggerSpec, Value};
use orc_storage::CreateRun;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of a trigger occurrence
#[derive(Debug, Clone, PartialEq)]
pub enum Triggered {
    Run(CreateRun),
    /// A deviation observation too close to the last reported value
    BelowThreshold { last: f64, value: f64 },
}

impl Triggered {
    pub fn run_id(&self) -> Option<&orc_core::RunId> {
        match self {
            Triggered::Run(created) => Some(&created.run().id),
            Triggered::BelowThreshold { .. } => None,
        }
    }
}

/// Period index of `epoch_ms` for a job ticking every `every`. Stable
/// within a period, so a restart does not produce a second Run for it.
pub fn tick_index(epoch_ms: u64, every: Duration) -> u64 {
    let period = u64::try_from(every.as_millis()).unwrap_or(u64::MAX).max(1);
    epoch_ms / period
}

/// Hand a newly created (or never started) Run to the executor
pub(crate) fn start_run<K: Clock>(executor: &Executor<K>, created: &CreateRun) -> Result<(), EngineError> {
    let run = created.run();
    if created.is_created() || run.status == RunStatus::Unstarted {
        executor.execute(&run.id)?;
    }
    Ok(())
}

/// Decides whether a deviation observation is worth a Run
#[derive(Clone)]
pub struct DeviationGate<K: Clock> {
    runs: RunMachine<K>,
}

impl<K: Clock> DeviationGate<K> {
    pub fn new(runs: RunMachine<K>) -> Self {
        Self { runs }
    }

    /// Compare `value` with the last reported one. The first observation,
    /// one that moves past any threshold, or one arriving after a quiet
    /// heartbeat period creates a Run; the value becomes the new baseline
    /// only when it does.
    pub fn observe(&self, job_id: &JobId, round_id: &str, value: f64) -> Result<Triggered, EngineError> {
        let store = self.runs.store();
        let job = store.job(job_id).ok_or_else(|| EngineError::UnknownJob(job_id.clone()))?;
        let TriggerSpec::Deviation { functions, every } = &job.trigger else {
            return Err(EngineError::TriggerMismatch { job: job_id.clone(), got: "deviation" });
        };
        if let Some(last) = store.last_feed(job_id) {
            let moved = functions.is_triggered(last.value, value);
            let heartbeat = every.is_some_and(|every| self.quiet_for(job_id, every));
            if !moved && !heartbeat {
                debug!(job = %job_id, last = last.value, value, "below deviation threshold");
                return Ok(Triggered::BelowThreshold { last: last.value, value });
            }
            if !moved {
                info!(job = %job_id, value, "deviation heartbeat");
            }
        }
        let event = TriggerEvent::Deviation { job_id: job_id.clone(), round_id: round_id.to_string(), value };
        let created = self.runs.create_run(job_id, &event)?;
        if created.is_created() {
            store.record_feed(job_id, round_id, value)?;
        }
        Ok(Triggered::Run(created))
    }

    fn quiet_for(&self, job_id: &JobId, every: Duration) -> bool {
        let last_run = self.runs.store().runs_for_job(job_id).last().map(|r| r.created_at_ms);
        let elapsed = self.runs.now_ms().saturating_sub(last_run.unwrap_or(0));
        u128::from(elapsed) >= every.as_millis()
    }
}

/// Create a Run for `job_id` once per period until `shutdown`
pub async fn run_interval<K: Clock>(
    runs: RunMachine<K>,
    executor: Executor<K>,
    job_id: JobId,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(job = %job_id, ?every, "interval trigger started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let tick = tick_index(runs.now_ms(), every);
        let event = TriggerEvent::Tick { job_id: job_id.clone(), tick };
        let result = runs.create_run(&job_id, &event).and_then(|created| start_run(&executor, &created));
        match result {
            Ok(()) => debug!(job = %job_id, tick, "interval tick"),
            Err(EngineError::UnknownJob(_)) => {
                warn!(job = %job_id, "job removed, stopping interval trigger");
                return;
            }
            Err(e) => warn!(job = %job_id, tick, error = %e, "interval tick dropped"),
        }
    }
}

/// Trigger occurrence for a matched log. The Run input carries the log.
pub fn log_event(log: &Log) -> TriggerEvent {
    let data = Value::Map(BTreeMap::from([
        ("address".to_string(), Value::Text(log.address.clone())),
        ("topics".to_string(), Value::List(log.topics.iter().cloned().map(Value::Text).collect())),
        ("data".to_string(), Value::Bytes(log.data.clone())),
        ("block_hash".to_string(), Value::Text(log.block_hash.to_string())),
        ("block_number".to_string(), Value::Number(log.block_number as f64)),
        ("tx_hash".to_string(), Value::Text(log.tx_hash.to_string())),
        ("log_index".to_string(), Value::Number(log.log_index as f64)),
    ]));
    TriggerEvent::Log {
        tx_hash: log.tx_hash.clone(),
        block_number: log.block_number,
        log_index: log.log_index,
        data,
    }
}

/// Scans new blocks for logs matching one job's trigger
pub struct LogListener<C: ChainClient, K: Clock> {
    chain: C,
    runs: RunMachine<K>,
    executor: Executor<K>,
    tracker: TrackerHandle,
    job_id: JobId,
    address: String,
    topics: Vec<String>,
    config: LogConfig,
    /// First block not yet scanned
    next: Option<u64>,
}

impl<C: ChainClient, K: Clock> LogListener<C, K> {
    /// A listener for `job`, or `None` when it is not a log job
    pub fn new(
        chain: C,
        runs: RunMachine<K>,
        executor: Executor<K>,
        tracker: TrackerHandle,
        job: &JobSpec,
        config: LogConfig,
    ) -> Option<Self> {
        let TriggerSpec::Log { address, topics } = &job.trigger else { return None };
        Some(Self {
            chain,
            runs,
            executor,
            tracker,
            job_id: job.id.clone(),
            address: address.clone(),
            topics: topics.clone(),
            config,
            next: None,
        })
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Scan from the last scanned block up to the tracker's head, at most
    /// `max_range` blocks at a time. Returns the number of Runs created. A
    /// failed scan is repeated in full on the next call.
    pub async fn poll(&mut self) -> Result<usize, EngineError> {
        let Some(top) = self.tracker.top().map(|h| h.number) else { return Ok(0) };
        let from = *self.next.get_or_insert(top.saturating_sub(self.config.lookback_blocks));
        if from > top {
            return Ok(0);
        }
        let to = top.min(from.saturating_add(self.config.max_range.max(1) - 1));
        let filter = LogFilter {
            address: self.address.clone(),
            topics: self.topics.clone(),
            from_block: from,
            to_block: to,
        };
        let logs = self.chain.logs(&filter).await?;
        let mut created = 0;
        for log in &logs {
            let run = self.runs.create_run(&self.job_id, &log_event(log))?;
            start_run(&self.executor, &run)?;
            if run.is_created() {
                info!(job = %self.job_id, block = log.block_number, index = log.log_index, "log matched");
                created += 1;
            }
        }
        self.next = Some(to + 1);
        debug!(job = %self.job_id, from, to, logs = logs.len(), "scanned logs");
        Ok(created)
    }
}

/// Poll `listener` every `poll_interval` until `shutdown`
pub async fn run_log_listener<C: ChainClient, K: Clock>(
    mut listener: LogListener<C, K>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(listener.config.poll_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(job = %listener.job_id, address = %listener.address, "log trigger started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }
        match listener.poll().await {
            Ok(_) => {}
            Err(EngineError::UnknownJob(_)) => {
                warn!(job = %listener.job_id, "job removed, stopping log trigger");
                return;
            }
            Err(e) => warn!(job = %listener.job_id, error = %e, "log scan failed, will retry"),
        }
    }
}

#[cfg(test)]
#[path = "triggers_tests.rs"]
mod tests;
