// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay

mod chain;
mod runs;

use orc_core::{
    BlockHash, Event, Head, JobId, JobSpec, PendingTransaction, Run, RunId, TxId,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Heads kept for restart recovery. Deeper history is dropped.
pub const HEAD_HISTORY_CAP: usize = 512;

/// Last value reported by a deviation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedValue {
    pub round_id: String,
    pub value: f64,
}

/// Materialized state built from WAL events.
///
/// Every `apply_*` is idempotent so a replay that overlaps a snapshot
/// converges to the same state.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    #[serde(default)]
    pub jobs: HashMap<JobId, JobSpec>,
    #[serde(default)]
    pub runs: HashMap<RunId, Run>,
    /// idempotency key → Run
    #[serde(default)]
    pub run_keys: HashMap<String, RunId>,
    /// Recent heads, oldest first
    #[serde(default)]
    pub heads: VecDeque<Head>,
    /// sending key → next unreserved nonce
    #[serde(default)]
    pub nonces: HashMap<String, u64>,
    #[serde(default)]
    pub txs: HashMap<TxId, PendingTransaction>,
    #[serde(default)]
    pub archived_txs: HashMap<TxId, PendingTransaction>,
    #[serde(default)]
    pub feeds: HashMap<JobId, FeedValue>,
}

impl MaterializedState {
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::JobRegistered { job } => {
                self.jobs.insert(job.id.clone(), job.clone());
            }
            Event::FeedRecorded { job_id, round_id, value } => {
                self.feeds.insert(job_id.clone(), FeedValue { round_id: round_id.clone(), value: *value });
            }
            Event::RunCreated { .. }
            | Event::RunStatusChanged { .. }
            | Event::RunTaskRecorded { .. }
            | Event::RunTaskConfirmed { .. }
            | Event::RunErrored { .. } => self.apply_run_event(event),
            Event::HeadObserved { .. }
            | Event::HeadsDiscarded { .. }
            | Event::NonceReserved { .. } => self.apply_chain_event(event),
            Event::TxSubmitted { .. }
            | Event::TxIncluded { .. }
            | Event::TxConfirmed { .. }
            | Event::TxInvalidated { .. }
            | Event::TxRebroadcast { .. }
            | Event::TxFatal { .. }
            | Event::TxArchived { .. } => self.apply_tx_event(event),
        }
    }

    pub fn run_by_key(&self, key: &str) -> Option<&Run> {
        self.run_keys.get(key).and_then(|id| self.runs.get(id))
    }

    /// Active or archived transaction created for `(run, task)`
    pub fn tx_for_task(&self, run_id: &RunId, task_id: &str) -> Option<&PendingTransaction> {
        self.txs
            .values()
            .chain(self.archived_txs.values())
            .find(|tx| &tx.run_id == run_id && tx.task_id == task_id)
    }

    pub fn head_by_hash(&self, hash: &BlockHash) -> Option<&Head> {
        self.heads.iter().find(|h| &h.hash == hash)
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
