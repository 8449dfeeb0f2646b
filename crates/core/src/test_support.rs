// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::{Event, Head, JobId, JobSpec, Run, RunId, TaskSpec, TriggerSpec, Value};

// ── Head factories ──────────────────────────────────────────────────────────

/// Deterministic hash for block `number` on branch `fork` (0 is canonical)
pub fn block_hash(number: u64, fork: u8) -> String {
    format!("0x{fork:02x}{number:062x}")
}

/// Head `number` on branch `fork` whose parent is on branch `parent_fork`
pub fn head_on(number: u64, fork: u8, parent_fork: u8) -> Head {
    let parent = if number == 0 { block_hash(0, 0xff) } else { block_hash(number - 1, parent_fork) };
    Head::new(block_hash(number, fork), parent, number, 1_700_000_000 + number * 12)
}

/// Canonical head `number`
pub fn head(number: u64) -> Head {
    head_on(number, 0, 0)
}

/// Canonical heads `from..=to`, oldest first
pub fn chain(from: u64, to: u64) -> Vec<Head> {
    (from..=to).map(head).collect()
}

/// Heads `from..=to` on `fork`, the first one attached to the canonical parent
pub fn fork(from: u64, to: u64, fork: u8) -> Vec<Head> {
    (from..=to).map(|n| head_on(n, fork, if n == from { 0 } else { fork })).collect()
}

// ── Job and event factories ─────────────────────────────────────────────────

pub fn web_job(id: &str, task_kinds: &[&str]) -> JobSpec {
    let tasks = task_kinds
        .iter()
        .enumerate()
        .map(|(i, kind)| TaskSpec::new(format!("t{i}"), *kind))
        .collect();
    JobSpec::new(id, TriggerSpec::Web, tasks)
}

pub fn run_created_event(run_id: &str, job_id: &str, key: &str) -> Event {
    Event::RunCreated {
        run: Run::new(RunId::from(run_id), JobId::from(job_id), key, Value::Null, 1_000_000),
    }
}

// ── Proptest strategies ─────────────────────────────────────────────────────

pub mod strategies {
    use crate::{Head, RunStatus};
    use proptest::prelude::*;

    pub fn arb_run_status() -> impl Strategy<Value = RunStatus> {
        prop_oneof![
            Just(RunStatus::Unstarted),
            Just(RunStatus::InProgress),
            Just(RunStatus::PendingConfirmation),
            Just(RunStatus::Completed),
            Just(RunStatus::Errored),
            Just(RunStatus::Cancelled),
        ]
    }

    /// A block tree in creation order. Each block after the genesis picks a
    /// parent among the last few blocks, which produces short forks as well
    /// as long runs. Parents always precede children.
    pub fn arb_block_tree() -> impl Strategy<Value = Vec<Head>> {
        prop::collection::vec(0usize..4, 1..48).prop_map(|picks| {
            let genesis = Head::new(format!("0x{:064x}", 0), format!("0x{:064x}", u64::MAX), 0, 0);
            let mut blocks = vec![genesis];
            for (i, back) in picks.into_iter().enumerate() {
                let parent_idx = blocks.len().saturating_sub(1 + back);
                let parent = &blocks[parent_idx];
                let head = Head::new(
                    format!("0x{:064x}", i + 1),
                    parent.hash.clone(),
                    parent.number + 1,
                    parent.timestamp + 12,
                );
                blocks.push(head);
            }
            blocks
        })
    }
}
