// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunables for the engine components

use orc_core::duration::serde_str;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum number of heads held in memory
    pub head_history: usize,
    /// Capacity of the channel to the coordinator
    pub event_buffer: usize,
    #[serde(with = "serde_str")]
    pub reconnect_initial: Duration,
    #[serde(with = "serde_str")]
    pub reconnect_max: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            head_history: 64,
            event_buffer: 256,
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Runs executed concurrently
    pub workers: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { workers: 8 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Used when a task spec does not set `confirmations`
    pub default_confirmations: u64,
    /// Head advances without inclusion before a fee bump
    pub stuck_after_heads: u64,
    pub fee_bump_percent: u64,
    pub initial_fee: u64,
    pub max_fee: u64,
    pub submission_buffer: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_confirmations: 12,
            stuck_after_heads: 5,
            fee_bump_percent: 20,
            initial_fee: 20_000_000_000,
            max_fee: 500_000_000_000,
            submission_buffer: 256,
        }
    }
}

impl CoordinatorConfig {
    /// Next fee after a bump, capped at `max_fee`
    pub fn bumped_fee(&self, fee: u64) -> u64 {
        let bump = (fee.saturating_mul(self.fee_bump_percent) / 100).max(1);
        fee.saturating_add(bump).min(self.max_fee)
    }
}

/// Log trigger polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    #[serde(with = "serde_str")]
    pub poll_interval: Duration,
    /// Blocks below the head rescanned when a listener starts
    pub lookback_blocks: u64,
    /// Widest block range asked for in one query
    pub max_range: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(2), lookback_blocks: 0, max_range: 1_000 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tracker: TrackerConfig,
    pub executor: ExecutorConfig,
    pub coordinator: CoordinatorConfig,
    pub logs: LogConfig,
}
