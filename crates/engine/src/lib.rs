// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orc-engine: head tracking, run execution and transaction confirmation

mod backoff;
mod config;
mod coordinator;
mod error;
mod head_tracker;
mod node;
mod pipeline;
mod runs;
mod triggers;

#[cfg(test)]
mod test_helpers;

pub use backoff::{jittered, task_delay, Reconnect};
pub use config::{CoordinatorConfig, EngineConfig, ExecutorConfig, LogConfig, TrackerConfig};
pub use coordinator::Coordinator;
pub use error::EngineError;
pub use head_tracker::{ChainChange, Confirmations, HeadChainView, HeadEvent, HeadTracker, TrackerHandle, Walk};
pub use node::{Node, NodeDeps};
pub use pipeline::{Executor, Submission};
pub use runs::RunMachine;
pub use triggers::{log_event, run_interval, run_log_listener, tick_index, DeviationGate, LogListener, Triggered};
