// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable event vocabulary.
//!
//! Every state change is recorded as an [`Event`] before it is applied, so
//! replaying the log rebuilds the exact state the node had.

mod methods;

use crate::error::RunError;
use crate::head::{BlockHash, Head, TxHash};
use crate::job::{JobId, JobSpec};
use crate::run::{ConfirmedTx, Run, RunId, RunStatus, TaskRun};
use crate::tx::{Inclusion, PendingTransaction, TxId};
use crate::value::{hex_bytes, Value};
use serde::{Deserialize, Serialize};

/// Serializes as `{"type": "run:created", ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "job:registered")]
    JobRegistered { job: JobSpec },

    /// Last value reported for a deviation job
    #[serde(rename = "feed:recorded")]
    FeedRecorded { job_id: JobId, round_id: String, value: f64 },

    #[serde(rename = "run:created")]
    RunCreated { run: Run },

    #[serde(rename = "run:status")]
    RunStatusChanged { id: RunId, status: RunStatus, at_ms: u64 },

    /// Append a TaskRun at position `index`. Applying it when the Run
    /// already holds more TaskRuns is a no-op.
    #[serde(rename = "run:task")]
    RunTaskRecorded { id: RunId, index: usize, task_run: TaskRun },

    /// Complete the parked TaskRun with its confirmed transaction
    #[serde(rename = "run:task:confirmed")]
    RunTaskConfirmed { id: RunId, task_id: String, output: Value, tx: ConfirmedTx, at_ms: u64 },

    #[serde(rename = "run:errored")]
    RunErrored { id: RunId, error: RunError, at_ms: u64 },

    #[serde(rename = "head:observed")]
    HeadObserved { head: Head },

    #[serde(rename = "head:discarded")]
    HeadsDiscarded { hashes: Vec<BlockHash> },

    /// `nonce` is now taken for `key`; the next reservation gets `nonce + 1`
    #[serde(rename = "nonce:reserved")]
    NonceReserved { key: String, nonce: u64 },

    #[serde(rename = "tx:submitted")]
    TxSubmitted { tx: PendingTransaction },

    #[serde(rename = "tx:included")]
    TxIncluded { id: TxId, inclusion: Inclusion },

    #[serde(rename = "tx:confirmed")]
    TxConfirmed { id: TxId },

    #[serde(rename = "tx:invalidated")]
    TxInvalidated { id: TxId },

    /// The same nonce was broadcast again. `resubmission` distinguishes a
    /// post-reorg resubmission from a stuck-transaction fee bump.
    #[serde(rename = "tx:rebroadcast")]
    TxRebroadcast {
        id: TxId,
        fee: u64,
        tx_hash: TxHash,
        #[serde(with = "hex_bytes")]
        raw: Vec<u8>,
        at_head: u64,
        resubmission: bool,
    },

    #[serde(rename = "tx:fatal")]
    TxFatal { id: TxId, error: String },

    #[serde(rename = "tx:archived")]
    TxArchived { id: TxId },
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
