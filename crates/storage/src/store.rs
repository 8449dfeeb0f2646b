// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transactional facade over the WAL and materialized state.
//!
//! Every write takes the store mutex, validates its precondition against the
//! current state, appends and flushes its events, then applies them. A
//! precondition failure writes nothing; a WAL failure leaves the state
//! untouched. This gives unique-key inserts and per-row compare-and-swap
//! without a database.

use crate::checkpoint::{load_snapshot, CheckpointResult, Checkpointer};
use crate::snapshot::SnapshotError;
use crate::state::{FeedValue, MaterializedState};
use crate::wal::{Wal, WalError};
use orc_core::{
    BlockHash, ConfirmedTx, ErrorKind, Event, Head, IdempotencyKey, JobId, JobSpec,
    PendingTransaction, Run, RunError, RunId, RunStatus, TaskRun, TxId, Value,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable")]
    Unavailable,
    #[error("unknown job: {0}")]
    UnknownJob(JobId),
    #[error("unknown run: {0}")]
    UnknownRun(RunId),
    #[error("run {id}: illegal transition {from} -> {to}")]
    InvalidTransition { id: RunId, from: RunStatus, to: RunStatus },
    #[error("run {id}: expected status {expected}, found {actual}")]
    Conflict { id: RunId, expected: RunStatus, actual: RunStatus },
    #[error("run {id}: expected {expected} task runs, found {actual}")]
    StaleTaskRuns { id: RunId, expected: usize, actual: usize },
    #[error("run {id}: no pending task run for {task_id}")]
    NoPendingTask { id: RunId, task_id: String },
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Unavailable | StoreError::Wal(_) | StoreError::Snapshot(_) => {
                ErrorKind::ResourceExhausted
            }
            _ => ErrorKind::Validation,
        }
    }

    /// A lost compare-and-swap: someone else moved the Run first
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict { .. }
                | StoreError::StaleTaskRuns { .. }
                | StoreError::InvalidTransition { .. }
        )
    }
}

/// Result of [`Store::create_run`]
#[derive(Debug, Clone, PartialEq)]
pub enum CreateRun {
    Created(Run),
    /// A Run already holds this idempotency key
    Existing(Run),
}

impl CreateRun {
    pub fn run(&self) -> &Run {
        match self {
            CreateRun::Created(run) | CreateRun::Existing(run) => run,
        }
    }

    pub fn into_run(self) -> Run {
        match self {
            CreateRun::Created(run) | CreateRun::Existing(run) => run,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CreateRun::Created(_))
    }
}

struct Inner {
    state: MaterializedState,
    wal: Option<Wal>,
    checkpointer: Option<Checkpointer>,
}

impl Inner {
    fn commit(&mut self, available: bool, events: Vec<Event>) -> Result<(), StoreError> {
        if !available {
            return Err(StoreError::Unavailable);
        }
        if let Some(wal) = self.wal.as_mut() {
            let written = events.iter().try_for_each(|e| wal.append(e).map(drop)).and_then(|()| wal.flush());
            if let Err(e) = written {
                wal.discard_unflushed();
                return Err(e.into());
            }
        }
        for event in &events {
            debug!(event = event.name(), "applying");
            self.state.apply_event(event);
        }
        if let Some(wal) = self.wal.as_mut() {
            let seq = wal.write_seq();
            wal.mark_processed(seq);
        }
        Ok(())
    }

    fn run(&self, id: &RunId) -> Result<&Run, StoreError> {
        self.state.runs.get(id).ok_or_else(|| StoreError::UnknownRun(id.clone()))
    }

    fn expect_status(&self, id: &RunId, expected: RunStatus) -> Result<&Run, StoreError> {
        let run = self.run(id)?;
        if run.status != expected {
            return Err(StoreError::Conflict { id: id.clone(), expected, actual: run.status });
        }
        Ok(run)
    }
}

fn check_transition(id: &RunId, from: RunStatus, to: RunStatus) -> Result<(), StoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition { id: id.clone(), from, to })
    }
}

#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<Inner>>,
    available: Arc<AtomicBool>,
}

impl Store {
    /// Open a durable store: load the snapshot, then replay newer WAL entries
    pub fn open(wal_path: &Path, snapshot_path: &Path) -> Result<Self, StoreError> {
        let (mut state, seq) = match load_snapshot(snapshot_path)? {
            Some(snapshot) => {
                info!(seq = snapshot.seq, runs = snapshot.state.runs.len(), "loaded snapshot");
                (snapshot.state, snapshot.seq)
            }
            None => {
                info!("no snapshot found, starting with empty state");
                (MaterializedState::default(), 0)
            }
        };

        let mut wal = Wal::open(wal_path, seq)?;
        let replay = wal.entries_after(seq)?;
        let replayed = replay.len();
        for entry in replay {
            state.apply_event(&entry.event);
            wal.mark_processed(entry.seq);
        }
        if replayed > 0 {
            info!(replayed, after = seq, "replayed WAL entries");
        }

        Ok(Self::from_parts(state, Some(wal), Some(Checkpointer::new(snapshot_path.to_path_buf()))))
    }

    /// A store with no files, for tests and dry runs
    pub fn in_memory() -> Self {
        Self::from_parts(MaterializedState::default(), None, None)
    }

    fn from_parts(state: MaterializedState, wal: Option<Wal>, checkpointer: Option<Checkpointer>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner { state, wal, checkpointer })),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Toggle the fault flag. While unavailable every write fails with
    /// [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn commit(&self, inner: &mut Inner, events: Vec<Event>) -> Result<(), StoreError> {
        let result = inner.commit(self.is_available(), events);
        if let Err(StoreError::Wal(WalError::Broken(_))) = &result {
            error!("WAL is in an unknown state, refusing further writes");
            self.set_available(false);
        }
        result
    }

    /// Append an event with no precondition
    pub fn record(&self, event: Event) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        self.commit(&mut inner, vec![event])
    }

    /// Run a closure against the current state
    pub fn read<R>(&self, f: impl FnOnce(&MaterializedState) -> R) -> R {
        f(&self.inner.lock().state)
    }

    // ── Jobs ────────────────────────────────────────────────────────────────

    /// Register or replace a job. Returns false when the identical spec was
    /// already registered.
    pub fn register_job(&self, job: JobSpec) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        if inner.state.jobs.get(&job.id) == Some(&job) {
            return Ok(false);
        }
        self.commit(&mut inner, vec![Event::JobRegistered { job }])?;
        Ok(true)
    }

    pub fn job(&self, id: &JobId) -> Option<JobSpec> {
        self.read(|s| s.jobs.get(id).cloned())
    }

    pub fn jobs(&self) -> Vec<JobSpec> {
        self.read(|s| {
            let mut jobs: Vec<_> = s.jobs.values().cloned().collect();
            jobs.sort_by(|a, b| a.id.cmp(&b.id));
            jobs
        })
    }

    // ── Runs ────────────────────────────────────────────────────────────────

    /// Insert a new Run unless one already holds `key`
    pub fn create_run(
        &self,
        id: RunId,
        job_id: &JobId,
        key: &IdempotencyKey,
        trigger: Value,
        now_ms: u64,
    ) -> Result<CreateRun, StoreError> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.state.run_by_key(key.as_str()) {
            return Ok(CreateRun::Existing(existing.clone()));
        }
        if !inner.state.jobs.contains_key(job_id) {
            return Err(StoreError::UnknownJob(job_id.clone()));
        }
        let run = Run::new(id, job_id.clone(), key.as_str(), trigger, now_ms);
        self.commit(&mut inner, vec![Event::RunCreated { run: run.clone() }])?;
        Ok(CreateRun::Created(run))
    }

    pub fn run(&self, id: &RunId) -> Option<Run> {
        self.read(|s| s.runs.get(id).cloned())
    }

    pub fn run_by_key(&self, key: &str) -> Option<Run> {
        self.read(|s| s.run_by_key(key).cloned())
    }

    /// Runs of a job, oldest first
    pub fn runs_for_job(&self, job_id: &JobId) -> Vec<Run> {
        self.runs_where(|r| &r.job_id == job_id)
    }

    pub fn runs_with_status(&self, statuses: &[RunStatus]) -> Vec<Run> {
        self.runs_where(|r| statuses.contains(&r.status))
    }

    fn runs_where(&self, pred: impl Fn(&Run) -> bool) -> Vec<Run> {
        self.read(|s| {
            let mut runs: Vec<_> = s.runs.values().filter(|&r| pred(r)).cloned().collect();
            runs.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then_with(|| a.id.cmp(&b.id)));
            runs
        })
    }

    /// Compare-and-swap the Run status from `from` to `to`
    pub fn transition(
        &self,
        id: &RunId,
        from: RunStatus,
        to: RunStatus,
        at_ms: u64,
    ) -> Result<Run, StoreError> {
        let mut inner = self.inner.lock();
        inner.expect_status(id, from)?;
        check_transition(id, from, to)?;
        self.commit(&mut inner, vec![Event::RunStatusChanged { id: id.clone(), status: to, at_ms }])?;
        inner.run(id).cloned()
    }

    /// Append a TaskRun at position `index`, optionally moving the Run to
    /// `next` in the same commit. Fails if the Run is not in `expected` or
    /// already holds a TaskRun at `index`.
    pub fn append_task_run(
        &self,
        id: &RunId,
        expected: RunStatus,
        index: usize,
        task_run: TaskRun,
        next: Option<RunStatus>,
        at_ms: u64,
    ) -> Result<Run, StoreError> {
        let mut inner = self.inner.lock();
        let actual = inner.expect_status(id, expected)?.task_runs.len();
        if actual != index {
            return Err(StoreError::StaleTaskRuns { id: id.clone(), expected: index, actual });
        }
        let mut events = vec![Event::RunTaskRecorded { id: id.clone(), index, task_run }];
        if let Some(next) = next {
            check_transition(id, expected, next)?;
            events.push(Event::RunStatusChanged { id: id.clone(), status: next, at_ms });
        }
        self.commit(&mut inner, events)?;
        inner.run(id).cloned()
    }

    /// Complete the parked TaskRun of a Run awaiting confirmation and move
    /// the Run to `next`
    pub fn confirm_task(
        &self,
        id: &RunId,
        task_id: &str,
        output: Value,
        tx: ConfirmedTx,
        next: RunStatus,
        at_ms: u64,
    ) -> Result<Run, StoreError> {
        let mut inner = self.inner.lock();
        let run = inner.expect_status(id, RunStatus::PendingConfirmation)?;
        if run.pending_task_run().map(|tr| tr.task_id.as_str()) != Some(task_id) {
            return Err(StoreError::NoPendingTask { id: id.clone(), task_id: task_id.to_string() });
        }
        check_transition(id, RunStatus::PendingConfirmation, next)?;
        let events = vec![
            Event::RunTaskConfirmed { id: id.clone(), task_id: task_id.to_string(), output, tx, at_ms },
            Event::RunStatusChanged { id: id.clone(), status: next, at_ms },
        ];
        self.commit(&mut inner, events)?;
        inner.run(id).cloned()
    }

    /// Mark a non-terminal Run `Errored` with its cause
    pub fn fail_run(&self, id: &RunId, error: RunError, at_ms: u64) -> Result<Run, StoreError> {
        let mut inner = self.inner.lock();
        let status = inner.run(id)?.status;
        check_transition(id, status, RunStatus::Errored)?;
        self.commit(&mut inner, vec![Event::RunErrored { id: id.clone(), error, at_ms }])?;
        inner.run(id).cloned()
    }

    /// Move a non-terminal Run to `Cancelled`
    pub fn cancel_run(&self, id: &RunId, at_ms: u64) -> Result<Run, StoreError> {
        let mut inner = self.inner.lock();
        let status = inner.run(id)?.status;
        check_transition(id, status, RunStatus::Cancelled)?;
        let event = Event::RunStatusChanged { id: id.clone(), status: RunStatus::Cancelled, at_ms };
        self.commit(&mut inner, vec![event])?;
        inner.run(id).cloned()
    }

    // ── Chain bookkeeping ───────────────────────────────────────────────────

    /// Reserve the next nonce for `key`. `floor` is the chain's confirmed
    /// nonce, which wins when it is ahead of the local counter.
    pub fn reserve_nonce(&self, key: &str, floor: u64) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        let nonce = inner.state.nonces.get(key).copied().unwrap_or(0).max(floor);
        self.commit(&mut inner, vec![Event::NonceReserved { key: key.to_string(), nonce }])?;
        Ok(nonce)
    }

    pub fn record_head(&self, head: Head) -> Result<(), StoreError> {
        self.record(Event::HeadObserved { head })
    }

    /// Persist an accepted branch change: drop `discarded`, then add `added`
    pub fn record_branch(&self, discarded: Vec<BlockHash>, added: Vec<Head>) -> Result<(), StoreError> {
        let mut events = Vec::with_capacity(added.len() + 1);
        if !discarded.is_empty() {
            events.push(Event::HeadsDiscarded { hashes: discarded });
        }
        events.extend(added.into_iter().map(|head| Event::HeadObserved { head }));
        let mut inner = self.inner.lock();
        self.commit(&mut inner, events)
    }

    /// Persisted recent heads, oldest first
    pub fn recent_heads(&self) -> Vec<Head> {
        self.read(|s| s.heads.iter().cloned().collect())
    }

    pub fn tx(&self, id: &TxId) -> Option<PendingTransaction> {
        self.read(|s| s.txs.get(id).or_else(|| s.archived_txs.get(id)).cloned())
    }

    /// Transactions not yet archived, ordered by nonce
    pub fn active_txs(&self) -> Vec<PendingTransaction> {
        self.read(|s| {
            let mut txs: Vec<_> = s.txs.values().cloned().collect();
            txs.sort_by(|a, b| a.from.cmp(&b.from).then(a.nonce.cmp(&b.nonce)));
            txs
        })
    }

    pub fn tx_for_task(&self, run_id: &RunId, task_id: &str) -> Option<PendingTransaction> {
        self.read(|s| s.tx_for_task(run_id, task_id).cloned())
    }

    // ── Feeds ───────────────────────────────────────────────────────────────

    pub fn record_feed(&self, job_id: &JobId, round_id: &str, value: f64) -> Result<(), StoreError> {
        self.record(Event::FeedRecorded {
            job_id: job_id.clone(),
            round_id: round_id.to_string(),
            value,
        })
    }

    pub fn last_feed(&self, job_id: &JobId) -> Option<FeedValue> {
        self.read(|s| s.feeds.get(job_id).cloned())
    }

    // ── Durability ──────────────────────────────────────────────────────────

    /// Snapshot the state and drop the WAL entries it covers. A no-op for
    /// in-memory stores.
    pub fn checkpoint(&self) -> Result<Option<CheckpointResult>, StoreError> {
        let mut inner = self.inner.lock();
        let Inner { state, wal, checkpointer } = &mut *inner;
        let (Some(wal), Some(checkpointer)) = (wal.as_mut(), checkpointer.as_ref()) else {
            return Ok(None);
        };
        wal.flush()?;
        let seq = wal.processed_seq();
        let result = checkpointer.checkpoint_sync(seq, state)?;
        wal.truncate_before(seq + 1)?;
        info!(seq = result.seq, size_bytes = result.size_bytes, "checkpoint written");
        Ok(Some(result))
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        if let Some(wal) = self.inner.lock().wal.as_mut() {
            wal.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
