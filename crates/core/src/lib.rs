// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orc-core: data model and event vocabulary for the oracle run engine

pub mod macros;

pub mod clock;
pub mod duration;
pub mod error;
pub mod event;
pub mod head;
pub mod id;
pub mod job;
pub mod run;
pub mod threshold;
pub mod trigger;
pub mod tx;
pub mod value;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use duration::{format_duration, parse_duration};
pub use error::{ErrorKind, RunError};
pub use event::Event;
pub use head::{BlockHash, Head, TxHash};
pub use id::short;
pub use job::{JobId, JobSpec, JobSpecError, RetryPolicy, TaskSpec, TriggerSpec};
pub use run::{ConfirmedTx, Run, RunId, RunStatus, TaskRun, TaskRunStatus};
pub use threshold::{ThresholdError, TriggerFn, TriggerFns};
pub use trigger::{IdempotencyKey, TriggerEvent};
pub use tx::{Inclusion, PendingTransaction, TxId, TxStatus, UnsignedTx};
pub use value::Value;
