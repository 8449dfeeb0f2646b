// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The assembled engine and its operator surface

use crate::config::{EngineConfig, LogConfig};
use crate::coordinator::Coordinator;
use crate::error::EngineError;
use crate::head_tracker::{Confirmations, HeadEvent, HeadTracker, TrackerHandle};
use crate::pipeline::{Executor, Submission};
use crate::runs::RunMachine;
use crate::triggers::{run_interval, run_log_listener, start_run, DeviationGate, LogListener, Triggered};
use orc_adapters::{ChainClient, Signer, TaskRegistry};
use orc_core::{
    BlockHash, Clock, Head, JobId, JobSpec, PendingTransaction, Run, RunId, RunStatus, TriggerEvent,
    TriggerSpec,
};
use orc_storage::Store;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Adapters and shared resources a [`Node`] is built from
pub struct NodeDeps<C, S, K> {
    pub chain: C,
    pub signer: S,
    pub store: Store,
    pub clock: K,
    pub registry: TaskRegistry,
}

/// Actors built by [`Node::new`] and spawned by [`Node::start`]
struct Actors<C: ChainClient, S: Signer, K: Clock> {
    tracker: HeadTracker<C>,
    coordinator: Coordinator<C, S, K>,
    heads: mpsc::Receiver<HeadEvent>,
    submissions: mpsc::Receiver<Submission>,
    resume: mpsc::Receiver<RunId>,
}

pub struct Node<C: ChainClient, S: Signer, K: Clock> {
    chain: C,
    logs: LogConfig,
    store: Store,
    runs: RunMachine<K>,
    executor: Executor<K>,
    gate: DeviationGate<K>,
    tracker: TrackerHandle,
    shutdown: CancellationToken,
    actors: Mutex<Option<Actors<C, S, K>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Interval tickers and log listeners by job
    sources: Mutex<HashMap<JobId, JoinHandle<()>>>,
}

impl<C: ChainClient, S: Signer, K: Clock> Node<C, S, K> {
    pub fn new(deps: NodeDeps<C, S, K>, config: EngineConfig) -> Self {
        let NodeDeps { chain, signer, store, clock, registry } = deps;
        let shutdown = CancellationToken::new();
        let runs = RunMachine::new(store.clone(), clock);

        let (head_tx, heads) = mpsc::channel(config.tracker.event_buffer.max(1));
        let (submission_tx, submissions) = mpsc::channel(config.coordinator.submission_buffer.max(1));
        let (resume_tx, resume) = mpsc::channel(config.coordinator.submission_buffer.max(1));

        let tracker = HeadTracker::new(chain.clone(), store.clone(), config.tracker.clone(), head_tx);
        let handle = tracker.handle();
        let coordinator = Coordinator::new(
            chain.clone(),
            signer,
            runs.clone(),
            handle.clone(),
            config.coordinator.clone(),
            resume_tx,
        );
        let executor = Executor::new(runs.clone(), registry, &config.executor, submission_tx, shutdown.clone());

        Self {
            chain,
            logs: config.logs.clone(),
            store,
            gate: DeviationGate::new(runs.clone()),
            runs,
            executor,
            tracker: handle,
            shutdown,
            actors: Mutex::new(Some(Actors { tracker, coordinator, heads, submissions, resume })),
            tasks: Mutex::new(Vec::new()),
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn the tracker and coordinator, resume interrupted Runs and start
    /// interval and log triggers. Calling it again does nothing.
    pub fn start(&self) {
        let Some(actors) = self.actors.lock().take() else {
            warn!("node already started");
            return;
        };
        let Actors { tracker, coordinator, heads, submissions, mut resume } = actors;
        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(tracker.run(self.shutdown.clone())));
        tasks.push(tokio::spawn(coordinator.run(submissions, heads, self.shutdown.clone())));

        let executor = self.executor.clone();
        let shutdown = self.shutdown.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                let id = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    next = resume.recv() => match next {
                        Some(id) => id,
                        None => return,
                    },
                };
                if let Err(e) = executor.execute(&id) {
                    warn!(run = %id, error = %e, "could not resume run");
                }
            }
        }));
        self.tasks.lock().extend(tasks);

        let interrupted = self.store.runs_with_status(&[RunStatus::Unstarted, RunStatus::InProgress]);
        info!(runs = interrupted.len(), "resuming interrupted runs");
        for run in interrupted {
            if let Err(e) = self.executor.execute(&run.id) {
                warn!(run = %run.id, error = %e, "could not resume run");
            }
        }
        for job in self.store.jobs() {
            self.start_source(&job);
        }
    }

    fn is_started(&self) -> bool {
        self.actors.lock().is_none()
    }

    /// Spawn the engine-owned trigger source of `job`, replacing any running
    /// one
    fn start_source(&self, job: &JobSpec) {
        let handle = match &job.trigger {
            TriggerSpec::Interval { every } => Some(tokio::spawn(run_interval(
                self.runs.clone(),
                self.executor.clone(),
                job.id.clone(),
                *every,
                self.shutdown.clone(),
            ))),
            TriggerSpec::Log { .. } => LogListener::new(
                self.chain.clone(),
                self.runs.clone(),
                self.executor.clone(),
                self.tracker.clone(),
                job,
                self.logs.clone(),
            )
            .map(|listener| tokio::spawn(run_log_listener(listener, self.shutdown.clone()))),
            TriggerSpec::Web | TriggerSpec::Deviation { .. } => None,
        };
        let mut sources = self.sources.lock();
        let previous = match handle {
            Some(handle) => sources.insert(job.id.clone(), handle),
            None => sources.remove(&job.id),
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Validate and register a job. Returns false when the identical spec
    /// was already registered.
    pub fn register_job(&self, job: JobSpec) -> Result<bool, EngineError> {
        job.validate()?;
        let registry = self.executor.registry();
        if let Some(task) = job.tasks.iter().find(|t| !registry.contains(&t.kind)) {
            return Err(EngineError::UnknownTaskType { job: job.id.clone(), kind: task.kind.clone() });
        }
        let changed = self.store.register_job(job.clone())?;
        if changed {
            info!(job = %job.id, trigger = job.trigger.kind(), tasks = job.tasks.len(), "job registered");
            if self.is_started() {
                self.start_source(&job);
            }
        }
        Ok(changed)
    }

    pub fn jobs(&self) -> Vec<JobSpec> {
        self.store.jobs()
    }

    /// Deliver a trigger occurrence for `job_id`. The same occurrence always
    /// maps to the same Run.
    pub fn trigger(&self, job_id: &JobId, event: TriggerEvent) -> Result<Triggered, EngineError> {
        if self.shutdown.is_cancelled() {
            return Err(EngineError::Shutdown);
        }
        if !self.store.is_available() {
            return Err(EngineError::Backpressure);
        }
        let triggered = match &event {
            TriggerEvent::Deviation { round_id, value, .. } => self.gate.observe(job_id, round_id, *value)?,
            _ => Triggered::Run(self.runs.create_run(job_id, &event)?),
        };
        if let Triggered::Run(created) = &triggered {
            start_run(&self.executor, created)?;
        }
        Ok(triggered)
    }

    pub fn run(&self, id: &RunId) -> Option<Run> {
        self.store.run(id)
    }

    pub fn runs_for_job(&self, job_id: &JobId) -> Vec<Run> {
        self.store.runs_for_job(job_id)
    }

    pub fn cancel_run(&self, id: &RunId) -> Result<Run, EngineError> {
        self.runs.cancel(id)
    }

    /// Transactions not yet confirmed and archived
    pub fn pending_transactions(&self) -> Vec<PendingTransaction> {
        self.store.active_txs()
    }

    pub fn head(&self) -> Option<Head> {
        self.tracker.top()
    }

    pub fn confirmations_of(&self, hash: &BlockHash) -> Confirmations {
        self.tracker.confirmations_of(hash)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Stop every actor, wait for workers to finish their current step and
    /// flush the store
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        let sources: Vec<_> = self.sources.lock().drain().map(|(_, h)| h).collect();
        for task in tasks.into_iter().chain(sources) {
            if let Err(e) = task.await {
                warn!(error = %e, "engine task ended abnormally");
            }
        }
        self.executor.idle().await;
        self.store.flush()?;
        info!("engine stopped");
        Ok(())
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
