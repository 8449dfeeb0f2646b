// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for engine unit tests

use orc_core::{RetryPolicy, RunId, RunStatus};
use orc_storage::Store;
use std::time::Duration;

/// Poll `cond` every 5ms for up to two seconds
pub(crate) async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

pub(crate) async fn wait_for_status(store: &Store, id: &RunId, status: RunStatus) {
    wait_for(&format!("run {id} to reach {status}"), || {
        store.run(id).map(|r| r.status) == Some(status)
    })
    .await;
}

/// Retry policy with millisecond delays and no jitter
pub(crate) fn quick_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
        multiplier: 2.0,
        jitter: 0.0,
    }
}
