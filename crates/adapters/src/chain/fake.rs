// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory chain for tests.
//!
//! Blocks are built on demand with [`FakeChain::mine`] and
//! [`FakeChain::reorg`]. Transactions accepted by `send_transaction` sit in a
//! mempool and are included by the next mined block, as are logs queued with
//! [`FakeChain::emit_log`]. Block hashes follow
//! [`orc_core::test_support::block_hash`], so canonical blocks equal
//! `test_support::head(n)`.

use super::{ChainClient, ChainError, Log, LogFilter, Receipt};
use crate::signer::{decode_envelope, envelope_hash};
use async_trait::async_trait;
use orc_core::test_support::{block_hash, head};
use orc_core::{BlockHash, Head, TxHash};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A transaction known to the fake chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeTx {
    pub hash: TxHash,
    pub from: String,
    pub nonce: u64,
    pub fee: u64,
}

struct FakeChainState {
    blocks: HashMap<BlockHash, Head>,
    /// Canonical block hashes indexed by number
    canonical: Vec<BlockHash>,
    block_txs: HashMap<BlockHash, Vec<FakeTx>>,
    block_logs: HashMap<BlockHash, Vec<Log>>,
    /// Logs waiting for the next block
    pending_logs: Vec<Log>,
    logs_emitted: u64,
    mempool: Vec<FakeTx>,
    sent: Vec<FakeTx>,
    subscribers: Vec<mpsc::Sender<Head>>,
    subscribe_calls: usize,
    send_failures: VecDeque<ChainError>,
    branch: u8,
    auto_include: bool,
    unreachable: bool,
}

impl FakeChainState {
    fn tip(&self) -> Head {
        self.canonical
            .last()
            .and_then(|h| self.blocks.get(h))
            .cloned()
            .unwrap_or_else(|| head(0))
    }

    fn check_reachable(&self) -> Result<(), ChainError> {
        if self.unreachable {
            return Err(ChainError::Unreachable("fake chain offline".into()));
        }
        Ok(())
    }

    fn canonical_txs(&self) -> impl Iterator<Item = (&Head, &FakeTx)> {
        self.canonical.iter().filter_map(|h| self.blocks.get(h)).flat_map(move |block| {
            self.block_txs.get(&block.hash).into_iter().flatten().map(move |tx| (block, tx))
        })
    }

    fn confirmed_nonce(&self, from: &str) -> u64 {
        self.canonical_txs()
            .filter(|(_, tx)| tx.from.eq_ignore_ascii_case(from))
            .map(|(_, tx)| tx.nonce + 1)
            .max()
            .unwrap_or(0)
    }

    /// Take mempool transactions that extend each sender's nonce sequence
    fn take_includable(&mut self) -> Vec<FakeTx> {
        let mut next: HashMap<String, u64> = HashMap::new();
        let mut pool = std::mem::take(&mut self.mempool);
        pool.sort_by(|a, b| (a.from.as_str(), a.nonce).cmp(&(b.from.as_str(), b.nonce)));
        let mut included = Vec::new();
        for tx in pool {
            let expected = match next.get(&tx.from) {
                Some(n) => *n,
                None => self.confirmed_nonce(&tx.from),
            };
            if tx.nonce == expected {
                next.insert(tx.from.clone(), expected + 1);
                included.push(tx);
            } else if tx.nonce > expected {
                self.mempool.push(tx);
            }
        }
        included
    }

    fn push_block(&mut self, include: bool) -> Head {
        let parent = self.tip();
        let number = parent.number + 1;
        let block = Head::new(block_hash(number, self.branch), parent.hash.clone(), number, parent.timestamp + 12);
        let txs = if include { self.take_includable() } else { Vec::new() };
        self.block_txs.insert(block.hash.clone(), txs);
        let logs: Vec<Log> = std::mem::take(&mut self.pending_logs)
            .into_iter()
            .enumerate()
            .map(|(i, log)| Log { block_hash: block.hash.clone(), block_number: number, log_index: i as u64, ..log })
            .collect();
        self.block_logs.insert(block.hash.clone(), logs);
        self.blocks.insert(block.hash.clone(), block.clone());
        self.canonical.push(block.hash.clone());
        block
    }

    fn announce(&mut self, head: &Head) {
        self.subscribers.retain(|tx| match tx.try_send(head.clone()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

/// Fake chain node for testing
#[derive(Clone)]
pub struct FakeChain {
    inner: Arc<Mutex<FakeChainState>>,
}

impl Default for FakeChain {
    fn default() -> Self {
        let genesis = head(0);
        Self {
            inner: Arc::new(Mutex::new(FakeChainState {
                blocks: HashMap::from([(genesis.hash.clone(), genesis.clone())]),
                canonical: vec![genesis.hash.clone()],
                block_txs: HashMap::new(),
                block_logs: HashMap::new(),
                pending_logs: Vec::new(),
                logs_emitted: 0,
                mempool: Vec::new(),
                sent: Vec::new(),
                subscribers: Vec::new(),
                subscribe_calls: 0,
                send_failures: VecDeque::new(),
                branch: 0,
                auto_include: true,
                unreachable: false,
            })),
        }
    }
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain already at `height`, with nothing announced
    pub fn with_height(height: u64) -> Self {
        let chain = Self::new();
        {
            let mut state = chain.inner.lock();
            for _ in 0..height {
                state.push_block(false);
            }
        }
        chain
    }

    pub fn tip(&self) -> Head {
        self.inner.lock().tip()
    }

    /// Extend the canonical chain by one block and announce it
    pub fn mine(&self) -> Head {
        let mut state = self.inner.lock();
        let include = state.auto_include;
        let block = state.push_block(include);
        state.announce(&block);
        block
    }

    pub fn mine_n(&self, n: u64) -> Head {
        let mut last = self.tip();
        for _ in 0..n {
            last = self.mine();
        }
        last
    }

    /// Replace the newest `depth` blocks with `len` empty blocks on a new
    /// branch and announce only the new tip. Transactions in discarded
    /// blocks return to the mempool.
    pub fn reorg(&self, depth: u64, len: u64) -> Head {
        self.reorg_inner(depth, len, false)
    }

    /// Like [`reorg`](Self::reorg), but the replacement blocks include the
    /// mempool. A mempool transaction already holding a nonce wins over a
    /// discarded one for the same nonce.
    pub fn reorg_including(&self, depth: u64, len: u64) -> Head {
        self.reorg_inner(depth, len, true)
    }

    fn reorg_inner(&self, depth: u64, len: u64, include: bool) -> Head {
        let mut state = self.inner.lock();
        let keep = state.canonical.len().saturating_sub(depth as usize).max(1);
        let discarded: Vec<BlockHash> = state.canonical.drain(keep..).collect();
        for hash in &discarded {
            let txs = state.block_txs.get(hash).cloned().unwrap_or_default();
            for tx in txs {
                if !state.mempool.iter().any(|m| m.from == tx.from && m.nonce == tx.nonce) {
                    state.mempool.push(tx);
                }
            }
        }
        state.branch = state.branch.wrapping_add(1);
        for _ in 0..len {
            state.push_block(include);
        }
        let tip = state.tip();
        state.announce(&tip);
        tip
    }

    /// Announce an arbitrary head, making it fetchable by hash
    pub fn announce(&self, head: Head) {
        let mut state = self.inner.lock();
        state.blocks.insert(head.hash.clone(), head.clone());
        state.announce(&head);
    }

    /// Put a competing transaction for `(from, nonce)` in the mempool,
    /// displacing ours, so the next mined block consumes the nonce
    pub fn consume_nonce(&self, from: &str, nonce: u64) -> TxHash {
        let hash = TxHash::new(format!("0x{:064x}", 0xdead_0000_u64 + nonce));
        let mut state = self.inner.lock();
        state.mempool.retain(|tx| !(tx.from.eq_ignore_ascii_case(from) && tx.nonce == nonce));
        state.mempool.push(FakeTx { hash: hash.clone(), from: from.to_ascii_lowercase(), nonce, fee: u64::MAX });
        hash
    }

    /// Queue a log for the next mined block, returning the hash of the
    /// transaction that emits it
    pub fn emit_log(&self, address: &str, topics: &[&str], data: &[u8]) -> TxHash {
        let mut state = self.inner.lock();
        state.logs_emitted += 1;
        let tx_hash = TxHash::new(format!("0x{:064x}", 0x1090_0000_u64 + state.logs_emitted));
        state.pending_logs.push(Log {
            address: address.to_ascii_lowercase(),
            topics: topics.iter().map(|t| t.to_ascii_lowercase()).collect(),
            data: data.to_vec(),
            block_hash: BlockHash::new(""),
            block_number: 0,
            tx_hash: tx_hash.clone(),
            log_index: 0,
        });
        tx_hash
    }

    /// When false, mined blocks include nothing and transactions get stuck
    pub fn set_auto_include(&self, on: bool) {
        self.inner.lock().auto_include = on;
    }

    /// Simulate losing the node. Open head streams end.
    pub fn set_unreachable(&self, unreachable: bool) {
        let mut state = self.inner.lock();
        state.unreachable = unreachable;
        if unreachable {
            state.subscribers.clear();
        }
    }

    /// Fail the next `send_transaction` with `err`
    pub fn fail_next_send(&self, err: ChainError) {
        self.inner.lock().send_failures.push_back(err);
    }

    /// Every accepted broadcast, in order
    pub fn sent(&self) -> Vec<FakeTx> {
        self.inner.lock().sent.clone()
    }

    pub fn mempool(&self) -> Vec<FakeTx> {
        self.inner.lock().mempool.clone()
    }

    /// Canonical block number including `hash`
    pub fn included_at(&self, hash: &TxHash) -> Option<u64> {
        let state = self.inner.lock();
        let number = state.canonical_txs().find(|(_, tx)| &tx.hash == hash).map(|(block, _)| block.number);
        number
    }

    pub fn subscribe_calls(&self) -> usize {
        self.inner.lock().subscribe_calls
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn subscribe_heads(&self) -> Result<mpsc::Receiver<Head>, ChainError> {
        let mut state = self.inner.lock();
        state.subscribe_calls += 1;
        state.check_reachable()?;
        let (tx, rx) = mpsc::channel(64);
        state.subscribers.push(tx);
        Ok(rx)
    }

    async fn head_by_hash(&self, hash: &BlockHash) -> Result<Option<Head>, ChainError> {
        let state = self.inner.lock();
        state.check_reachable()?;
        Ok(state.blocks.get(hash).cloned())
    }

    async fn latest_head(&self) -> Result<Head, ChainError> {
        let state = self.inner.lock();
        state.check_reachable()?;
        Ok(state.tip())
    }

    async fn send_transaction(&self, raw: &[u8]) -> Result<TxHash, ChainError> {
        let mut state = self.inner.lock();
        state.check_reachable()?;
        if let Some(err) = state.send_failures.pop_front() {
            return Err(err);
        }
        let body = decode_envelope(raw)
            .ok_or_else(|| ChainError::Rpc { code: -32602, message: "invalid raw transaction".into() })?;
        let hash = envelope_hash(raw);
        if body.nonce < state.confirmed_nonce(&body.from) {
            return Err(ChainError::NonceTooLow);
        }
        if state.mempool.iter().any(|tx| tx.hash == hash) {
            return Err(ChainError::AlreadyKnown);
        }
        let from = body.from.to_ascii_lowercase();
        state.mempool.retain(|tx| !(tx.from == from && tx.nonce == body.nonce));
        let tx = FakeTx { hash: hash.clone(), from, nonce: body.nonce, fee: body.fee };
        state.mempool.push(tx.clone());
        state.sent.push(tx);
        Ok(hash)
    }

    async fn receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, ChainError> {
        let state = self.inner.lock();
        state.check_reachable()?;
        let receipt = state.canonical_txs().find(|(_, tx)| &tx.hash == hash).map(|(block, tx)| Receipt {
            tx_hash: tx.hash.clone(),
            block_hash: block.hash.clone(),
            block_number: block.number,
            success: true,
        });
        Ok(receipt)
    }

    async fn nonce_at(&self, address: &str) -> Result<u64, ChainError> {
        let state = self.inner.lock();
        state.check_reachable()?;
        Ok(state.confirmed_nonce(address))
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainError> {
        let state = self.inner.lock();
        state.check_reachable()?;
        let logs = state
            .canonical
            .iter()
            .filter_map(|hash| state.block_logs.get(hash))
            .flatten()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect();
        Ok(logs)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
