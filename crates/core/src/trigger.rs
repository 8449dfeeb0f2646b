// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger occurrences and the idempotency keys they map to.
//!
//! A key is derived only from the occurrence itself, so the same log, tick,
//! request or round always yields the same key no matter how many times or
//! from how many places it is delivered.

use crate::head::TxHash;
use crate::job::JobId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Deterministic identifier of a trigger occurrence
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(pub String);

impl IdempotencyKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdempotencyKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEvent {
    /// A matching contract log
    Log { tx_hash: TxHash, block_number: u64, log_index: u64, data: Value },
    /// An interval tick. `tick` is the period index since the epoch.
    Tick { job_id: JobId, tick: u64 },
    /// An external request
    Web { request_id: String, body: Value },
    /// A deviation round with the observed value
    Deviation { job_id: JobId, round_id: String, value: f64 },
}

impl TriggerEvent {
    pub fn key(&self) -> IdempotencyKey {
        IdempotencyKey(match self {
            TriggerEvent::Log { tx_hash, block_number, log_index, .. } => {
                format!("log:{tx_hash}:block{block_number}:idx{log_index}")
            }
            TriggerEvent::Tick { job_id, tick } => format!("interval:{job_id}:{tick}"),
            TriggerEvent::Web { request_id, .. } => format!("web:{request_id}"),
            TriggerEvent::Deviation { job_id, round_id, .. } => {
                format!("deviation:{job_id}:{round_id}")
            }
        })
    }

    /// Input to the first task of the Run
    pub fn payload(&self) -> Value {
        match self {
            TriggerEvent::Log { data, .. } => data.clone(),
            TriggerEvent::Tick { tick, .. } => {
                Value::Map(BTreeMap::from([("tick".to_string(), Value::Number(*tick as f64))]))
            }
            TriggerEvent::Web { body, .. } => body.clone(),
            TriggerEvent::Deviation { value, .. } => Value::Number(*value),
        }
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
