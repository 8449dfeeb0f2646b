// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transaction signing

use async_trait::async_trait;
use orc_core::{TxHash, UnsignedTx};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("signer has no key for {0}")]
    UnknownAccount(String),
    #[error("signing failed: {0}")]
    Failed(String),
}

/// Signed bytes ready for broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub raw: Vec<u8>,
    pub hash: TxHash,
}

/// Produces broadcastable bytes for the node's sending account.
///
/// Signing must be deterministic: the same body yields the same bytes, so a
/// same-fee resubmission after a reorg carries the same hash.
#[async_trait]
pub trait Signer: Clone + Send + Sync + 'static {
    fn address(&self) -> &str;

    async fn sign(&self, tx: &UnsignedTx) -> Result<SignedTx, SignerError>;
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    v: u32,
    tx: UnsignedTx,
}

const ENVELOPE_VERSION: u32 = 1;

/// Signer that wraps the body in a versioned JSON envelope and hashes it
/// with SHA-256.
///
/// There is no private key. It is accepted by [`FakeChain`](crate::FakeChain)
/// and by development nodes that unwrap the envelope.
#[derive(Debug, Clone)]
pub struct EnvelopeSigner {
    address: String,
}

impl EnvelopeSigner {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into().to_ascii_lowercase() }
    }
}

#[async_trait]
impl Signer for EnvelopeSigner {
    fn address(&self) -> &str {
        &self.address
    }

    async fn sign(&self, tx: &UnsignedTx) -> Result<SignedTx, SignerError> {
        if !tx.from.eq_ignore_ascii_case(&self.address) {
            return Err(SignerError::UnknownAccount(tx.from.clone()));
        }
        let raw = serde_json::to_vec(&Envelope { v: ENVELOPE_VERSION, tx: tx.clone() })
            .map_err(|e| SignerError::Failed(e.to_string()))?;
        let hash = envelope_hash(&raw);
        Ok(SignedTx { raw, hash })
    }
}

pub fn envelope_hash(raw: &[u8]) -> TxHash {
    TxHash::new(format!("0x{}", hex::encode(Sha256::digest(raw))))
}

/// Recover the body from bytes produced by [`EnvelopeSigner`]
pub fn decode_envelope(raw: &[u8]) -> Option<UnsignedTx> {
    let envelope: Envelope = serde_json::from_slice(raw).ok()?;
    (envelope.v == ENVELOPE_VERSION).then_some(envelope.tx)
}

#[cfg(test)]
#[path = "signer_tests.rs"]
mod tests;
