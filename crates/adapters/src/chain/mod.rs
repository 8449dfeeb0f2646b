// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blockchain RPC adapter

mod codec;
mod rpc;

pub use rpc::WsRpcClient;

use async_trait::async_trait;
use orc_core::{BlockHash, ErrorKind, Head, TxHash};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("chain unreachable: {0}")]
    Unreachable(String),
    #[error("connection closed")]
    Closed,
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("nonce too low")]
    NonceTooLow,
    #[error("transaction already known")]
    AlreadyKnown,
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::NonceTooLow => ErrorKind::ChainConsistency,
            ChainError::Decode(_) => ErrorKind::Validation,
            _ => ErrorKind::Transient,
        }
    }
}

/// Inclusion record for a broadcast transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_hash: BlockHash,
    pub block_number: u64,
    pub success: bool,
}

/// A contract log on the canonical chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: String,
    pub topics: Vec<String>,
    pub data: Vec<u8>,
    pub block_hash: BlockHash,
    pub block_number: u64,
    pub tx_hash: TxHash,
    pub log_index: u64,
}

/// Logs emitted by `address` in `from_block..=to_block`. Topics match by
/// position; an empty topic matches anything, as do positions past the
/// end of the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: String,
    pub topics: Vec<String>,
    pub from_block: u64,
    pub to_block: u64,
}

impl LogFilter {
    pub fn matches(&self, log: &Log) -> bool {
        if !(self.from_block..=self.to_block).contains(&log.block_number) {
            return false;
        }
        if !log.address.eq_ignore_ascii_case(&self.address) {
            return false;
        }
        self.topics.iter().enumerate().all(|(i, wanted)| {
            wanted.is_empty() || log.topics.get(i).is_some_and(|t| t.eq_ignore_ascii_case(wanted))
        })
    }
}

/// Access to a chain node
#[async_trait]
pub trait ChainClient: Clone + Send + Sync + 'static {
    /// Stream of new canonical heads. The stream closes when the
    /// connection drops; callers resubscribe.
    async fn subscribe_heads(&self) -> Result<mpsc::Receiver<Head>, ChainError>;

    async fn head_by_hash(&self, hash: &BlockHash) -> Result<Option<Head>, ChainError>;

    async fn latest_head(&self) -> Result<Head, ChainError>;

    /// Broadcast signed bytes, returning the node's transaction hash
    async fn send_transaction(&self, raw: &[u8]) -> Result<TxHash, ChainError>;

    /// Receipt on the node's canonical chain, if included
    async fn receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, ChainError>;

    /// Confirmed transaction count for `address` at the latest block
    async fn nonce_at(&self, address: &str) -> Result<u64, ChainError>;

    /// Canonical logs matching `filter`, oldest first
    async fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainError>;
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeChain, FakeTx};

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
