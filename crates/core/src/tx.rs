// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transactions owned by the confirmation coordinator

use crate::head::{BlockHash, TxHash};
use crate::run::RunId;
use crate::value::hex_bytes;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifier of a PendingTransaction
    pub struct TxId("ptx-");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Submitted,
    Confirmed,
    /// Inclusion was discarded by a reorg; awaiting resubmission
    Invalidated,
    /// The nonce was consumed by another transaction
    Fatal,
}

crate::simple_display! {
    TxStatus {
        Submitted => "submitted",
        Confirmed => "confirmed",
        Invalidated => "invalidated",
        Fatal => "fatal",
    }
}

impl TxStatus {
    /// Confirmed and Fatal transactions are archived
    pub fn is_final(self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Fatal)
    }
}

/// Block a transaction was observed in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inclusion {
    pub block_hash: BlockHash,
    pub block_number: u64,
    /// The broadcast that landed, which after a fee bump may be an earlier one
    pub tx_hash: TxHash,
}

/// Unsigned transaction body handed to the signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTx {
    pub from: String,
    pub to: String,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    pub nonce: u64,
    pub fee: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub id: TxId,
    pub run_id: RunId,
    pub task_id: String,
    pub from: String,
    pub to: String,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    pub nonce: u64,
    pub fee: u64,
    pub tx_hash: TxHash,
    /// Signed bytes of the current broadcast
    #[serde(with = "hex_bytes")]
    pub raw: Vec<u8>,
    pub submitted_at_head: u64,
    /// Head number of the latest (re)broadcast, used for stuck detection
    pub last_broadcast_head: u64,
    pub required_confirmations: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inclusion: Option<Inclusion>,
    pub status: TxStatus,
    /// Same-fee resubmissions after reorg invalidation
    #[serde(default)]
    pub resubmissions: u32,
    #[serde(default)]
    pub fee_bumps: u32,
    /// Hashes of earlier broadcasts replaced by a fee bump; any of them may
    /// still be the one that lands
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prior_hashes: Vec<TxHash>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PendingTransaction {
    pub fn unsigned(&self) -> UnsignedTx {
        UnsignedTx {
            from: self.from.clone(),
            to: self.to.clone(),
            data: self.data.clone(),
            nonce: self.nonce,
            fee: self.fee,
        }
    }

    pub fn is_included(&self) -> bool {
        self.inclusion.is_some()
    }

    /// Current hash first, then earlier broadcasts newest first
    pub fn all_hashes(&self) -> impl Iterator<Item = &TxHash> {
        std::iter::once(&self.tx_hash).chain(self.prior_hashes.iter().rev())
    }
}
