// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orc-adapters: chain access, signing and pipeline tasks

pub mod chain;
pub mod signer;
pub mod task;

pub use chain::{ChainClient, ChainError, Log, LogFilter, Receipt, WsRpcClient};
pub use signer::{decode_envelope, EnvelopeSigner, SignedTx, Signer, SignerError};
pub use task::{
    HttpFetch, JsonParse, Multiply, Noop, SubmitTx, Task, TaskContext, TaskError, TaskOutput,
    TaskRegistry, TxRequest,
};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use chain::{FakeChain, FakeTx};
#[cfg(any(test, feature = "test-support"))]
pub use task::{ScriptStep, ScriptedTask};
