// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{MaterializedState, HEAD_HISTORY_CAP};
use orc_core::{Event, TxStatus};

impl MaterializedState {
    pub(super) fn apply_chain_event(&mut self, event: &Event) {
        match event {
            Event::HeadObserved { head } => {
                if self.heads.iter().any(|h| h.hash == head.hash) {
                    return;
                }
                self.heads.push_back(head.clone());
                while self.heads.len() > HEAD_HISTORY_CAP {
                    self.heads.pop_front();
                }
            }
            Event::HeadsDiscarded { hashes } => {
                self.heads.retain(|h| !hashes.contains(&h.hash));
            }
            Event::NonceReserved { key, nonce } => {
                let next = self.nonces.entry(key.clone()).or_insert(0);
                *next = (*next).max(nonce + 1);
            }
            _ => {}
        }
    }

    pub(super) fn apply_tx_event(&mut self, event: &Event) {
        match event {
            Event::TxSubmitted { tx } => {
                if !self.archived_txs.contains_key(&tx.id) {
                    self.txs.entry(tx.id.clone()).or_insert_with(|| tx.clone());
                }
            }
            Event::TxIncluded { id, inclusion } => {
                if let Some(tx) = self.txs.get_mut(id) {
                    if !tx.status.is_final() {
                        tx.inclusion = Some(inclusion.clone());
                        tx.status = TxStatus::Submitted;
                    }
                }
            }
            Event::TxConfirmed { id } => {
                if let Some(tx) = self.txs.get_mut(id) {
                    tx.status = TxStatus::Confirmed;
                }
            }
            Event::TxInvalidated { id } => {
                if let Some(tx) = self.txs.get_mut(id) {
                    tx.status = TxStatus::Invalidated;
                    tx.inclusion = None;
                }
            }
            Event::TxRebroadcast { id, fee, tx_hash, raw, at_head, resubmission } => {
                let Some(tx) = self.txs.get_mut(id) else { return };
                if &tx.tx_hash == tx_hash && tx.last_broadcast_head == *at_head {
                    return;
                }
                let rehashed = &tx.tx_hash != tx_hash;
                if rehashed {
                    let replaced = std::mem::replace(&mut tx.tx_hash, tx_hash.clone());
                    if !tx.prior_hashes.contains(&replaced) {
                        tx.prior_hashes.push(replaced);
                    }
                }
                tx.fee = *fee;
                tx.raw = raw.clone();
                tx.last_broadcast_head = *at_head;
                tx.status = TxStatus::Submitted;
                tx.inclusion = None;
                // Same bytes without a resubmission is a resend at the fee cap
                if *resubmission {
                    tx.resubmissions += 1;
                } else if rehashed {
                    tx.fee_bumps += 1;
                }
            }
            Event::TxFatal { id, error } => {
                if let Some(tx) = self.txs.get_mut(id) {
                    tx.status = TxStatus::Fatal;
                    tx.error = Some(error.clone());
                }
            }
            Event::TxArchived { id } => {
                if let Some(tx) = self.txs.remove(id) {
                    self.archived_txs.insert(id.clone(), tx);
                }
            }
            _ => {}
        }
    }
}
