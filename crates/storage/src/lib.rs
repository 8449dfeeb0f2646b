// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orc-storage: event log, snapshots and the transactional store

mod checkpoint;
mod snapshot;
mod state;
mod store;
mod wal;

pub use checkpoint::{load_snapshot, CheckpointResult, Checkpointer};
pub use snapshot::{Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use state::{FeedValue, MaterializedState, HEAD_HISTORY_CAP};
pub use store::{CreateRun, Store, StoreError};
pub use wal::{Wal, WalEntry, WalError};
