// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transaction Confirmation Coordinator.
//!
//! A single actor owns every PendingTransaction. It takes submissions from
//! the executor and head events from the tracker, in that order of arrival,
//! and is the only writer of `tx:*` events. Each change is persisted before
//! anything is sent to the chain, so a restart can always tell what was
//! broadcast.

use crate::config::CoordinatorConfig;
use crate::error::EngineError;
use crate::head_tracker::{Confirmations, HeadEvent, TrackerHandle};
use crate::pipeline::{request_from_value, Submission};
use crate::runs::RunMachine;
use orc_adapters::{ChainClient, ChainError, Receipt, Signer};
use orc_core::{
    BlockHash, Clock, ConfirmedTx, ErrorKind, Event, Inclusion, PendingTransaction, RunError, RunId,
    RunStatus, TxId, TxStatus, UnsignedTx, Value,
};
use orc_storage::{Store, StoreError};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Coordinator<C: ChainClient, S: Signer, K: Clock> {
    chain: C,
    signer: S,
    runs: RunMachine<K>,
    tracker: TrackerHandle,
    config: CoordinatorConfig,
    /// Runs with tasks left after a confirmation
    resume: mpsc::Sender<RunId>,
    /// Submissions deferred by a chain or store outage
    deferred: Vec<Submission>,
}

impl<C: ChainClient, S: Signer, K: Clock> Coordinator<C, S, K> {
    pub fn new(
        chain: C,
        signer: S,
        runs: RunMachine<K>,
        tracker: TrackerHandle,
        config: CoordinatorConfig,
        resume: mpsc::Sender<RunId>,
    ) -> Self {
        Self { chain, signer, runs, tracker, config, resume, deferred: Vec::new() }
    }

    fn store(&self) -> &Store {
        self.runs.store()
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// Recover, then serve submissions and head events until `shutdown`
    pub async fn run(
        mut self,
        mut submissions: mpsc::Receiver<Submission>,
        mut heads: mpsc::Receiver<HeadEvent>,
        shutdown: CancellationToken,
    ) {
        self.recover().await;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(event) = heads.recv() => self.on_head_event(event).await,
                Some(submission) = submissions.recv() => self.submit(submission).await,
                else => break,
            }
        }
        debug!(deferred = self.deferred.len(), "coordinator stopped");
    }

    /// Pick up where a previous process left off: submit parked Runs that
    /// never reached the store as a transaction, finish interrupted
    /// confirmations and rebroadcast everything still in flight.
    pub async fn recover(&mut self) {
        let parked = self.store().runs_with_status(&[RunStatus::PendingConfirmation]);
        for run in parked {
            let Some(task_run) = run.pending_task_run() else { continue };
            let Some(tx_id) = task_run.pending_tx.clone() else { continue };
            if self.store().tx(&tx_id).is_some() {
                continue;
            }
            match request_from_value(&task_run.output) {
                Some(request) => {
                    info!(run = %run.id, task = %task_run.task_id, "resubmitting unrecorded transaction");
                    let submission =
                        Submission { tx_id, run_id: run.id.clone(), task_id: task_run.task_id.clone(), request };
                    self.submit(submission).await;
                }
                None => {
                    let cause = RunError::new(ErrorKind::Validation, "parked task has no transaction request")
                        .in_task(&task_run.task_id);
                    if let Err(e) = self.runs.fail(&run.id, cause) {
                        warn!(run = %run.id, error = %e, "could not fail run");
                    }
                }
            }
        }

        for tx in self.store().active_txs() {
            let result = match (&tx.status, &tx.inclusion) {
                (TxStatus::Confirmed | TxStatus::Fatal, _) => self.finish(&tx.id).await,
                (_, Some(inclusion)) => {
                    self.tracker.watch(inclusion.block_hash.clone(), tx.required_confirmations);
                    Ok(())
                }
                (_, None) => {
                    self.send(&tx, &tx.raw).await;
                    Ok(())
                }
            };
            if let Err(e) = result {
                warn!(tx = %tx.id, error = %e, "recovery step failed");
            }
        }
        info!(active = self.store().active_txs().len(), "coordinator recovered");
    }

    /// Accept a transaction from the executor. Outages defer it to the next
    /// head; anything else that goes wrong fails the Run.
    pub async fn submit(&mut self, submission: Submission) {
        let run_id = submission.run_id.clone();
        let task_id = submission.task_id.clone();
        match self.try_submit(submission.clone()).await {
            Ok(()) => {}
            Err(e) if matches!(e.kind(), ErrorKind::Transient | ErrorKind::ResourceExhausted) => {
                warn!(run = %run_id, task = %task_id, error = %e, "submission deferred");
                self.deferred.push(submission);
            }
            Err(e) => {
                let cause = RunError::new(e.kind(), e.to_string()).in_task(&task_id);
                if let Err(e) = self.runs.fail(&run_id, cause) {
                    warn!(run = %run_id, error = %e, "could not fail run");
                }
            }
        }
    }

    async fn try_submit(&mut self, submission: Submission) -> Result<(), EngineError> {
        let Submission { tx_id, run_id, task_id, request } = submission;
        let Some(run) = self.store().run(&run_id) else {
            warn!(run = %run_id, "submission for unknown run dropped");
            return Ok(());
        };
        if run.status != RunStatus::PendingConfirmation {
            info!(run = %run_id, status = %run.status, "submission dropped, run moved on");
            return Ok(());
        }
        if let Some(existing) = self.store().tx_for_task(&run_id, &task_id) {
            debug!(run = %run_id, tx = %existing.id, "task already has a transaction");
            return Ok(());
        }
        let job = self.store().job(&run.job_id).ok_or_else(|| EngineError::UnknownJob(run.job_id.clone()))?;
        let required = job
            .task(&task_id)
            .and_then(|t| t.confirmations)
            .unwrap_or(self.config.default_confirmations);

        let from = self.signer.address().to_string();
        let floor = self.chain.nonce_at(&from).await?;
        let nonce = self.store().reserve_nonce(&from, floor)?;
        let unsigned =
            UnsignedTx { from, to: request.to, data: request.data, nonce, fee: self.config.initial_fee };
        let signed = self.signer.sign(&unsigned).await?;
        let head = self.tracker.top_number();
        let tx = PendingTransaction {
            id: tx_id,
            run_id,
            task_id,
            from: unsigned.from,
            to: unsigned.to,
            data: unsigned.data,
            nonce,
            fee: unsigned.fee,
            tx_hash: signed.hash,
            raw: signed.raw,
            submitted_at_head: head,
            last_broadcast_head: head,
            required_confirmations: required,
            inclusion: None,
            status: TxStatus::Submitted,
            resubmissions: 0,
            fee_bumps: 0,
            prior_hashes: Vec::new(),
            created_at_ms: self.runs.now_ms(),
            error: None,
        };
        self.store().record(Event::TxSubmitted { tx: tx.clone() })?;
        info!(tx = %tx.id, run = %tx.run_id, nonce, hash = %tx.tx_hash, head, required, "transaction submitted");
        self.send(&tx, &tx.raw).await;
        Ok(())
    }

    pub async fn on_head_event(&mut self, event: HeadEvent) {
        match event {
            HeadEvent::Reorg { discarded, .. } => self.on_reorg(&discarded).await,
            HeadEvent::HeadConfirmed { hash, depth, .. } => self.on_confirmed(&hash, depth).await,
            HeadEvent::NewHead(head) => self.on_new_head(head.number).await,
        }
    }

    async fn on_confirmed(&mut self, hash: &BlockHash, depth: u64) {
        for tx in self.store().active_txs() {
            let in_block = tx.inclusion.as_ref().is_some_and(|i| &i.block_hash == hash);
            if in_block && tx.status == TxStatus::Submitted && depth >= tx.required_confirmations {
                if let Err(e) = self.confirm(&tx.id).await {
                    warn!(tx = %tx.id, error = %e, "confirmation failed");
                }
            }
        }
    }

    async fn on_new_head(&mut self, number: u64) {
        for submission in std::mem::take(&mut self.deferred) {
            self.submit(submission).await;
        }
        for tx in self.store().active_txs() {
            let result = match tx.status {
                TxStatus::Confirmed | TxStatus::Fatal => self.finish(&tx.id).await,
                TxStatus::Invalidated => self.resubmit(&tx).await,
                TxStatus::Submitted if tx.inclusion.is_none() => self.poll(&tx, number).await,
                TxStatus::Submitted => self.check_depth(&tx).await,
            };
            if let Err(e) = result {
                warn!(tx = %tx.id, head = number, error = %e, "transaction check failed");
            }
        }
    }

    async fn on_reorg(&mut self, discarded: &[BlockHash]) {
        for tx in self.store().active_txs() {
            let orphaned = tx.inclusion.as_ref().is_some_and(|i| discarded.contains(&i.block_hash));
            if !orphaned || tx.status.is_final() {
                continue;
            }
            if let Err(e) = self.reorged(&tx, discarded).await {
                warn!(tx = %tx.id, error = %e, "could not handle reorged transaction");
            }
        }
    }

    /// The inclusion block of `tx` was discarded
    async fn reorged(&mut self, tx: &PendingTransaction, discarded: &[BlockHash]) -> Result<(), EngineError> {
        let confirmed = self.chain.nonce_at(&tx.from).await?;
        if let Some(receipt) = self.find_receipt(tx).await? {
            if !discarded.contains(&receipt.block_hash) {
                info!(tx = %tx.id, block = receipt.block_number, "transaction re-included on new branch");
                return self.on_receipt(tx, receipt).await;
            }
        }
        self.store().record(Event::TxInvalidated { id: tx.id.clone() })?;
        warn!(tx = %tx.id, nonce = tx.nonce, "inclusion discarded by reorg");
        if confirmed > tx.nonce {
            return self.fatal(&tx.id, format!("nonce {} consumed by another transaction", tx.nonce)).await;
        }
        self.resubmit(tx).await
    }

    /// Same nonce, same fee, same bytes
    async fn resubmit(&mut self, tx: &PendingTransaction) -> Result<(), EngineError> {
        let head = self.tracker.top_number();
        self.store().record(Event::TxRebroadcast {
            id: tx.id.clone(),
            fee: tx.fee,
            tx_hash: tx.tx_hash.clone(),
            raw: tx.raw.clone(),
            at_head: head,
            resubmission: true,
        })?;
        info!(tx = %tx.id, nonce = tx.nonce, head, "resubmitting transaction");
        self.send(tx, &tx.raw).await;
        Ok(())
    }

    /// Look for a receipt, detect a consumed nonce, bump the fee if stuck
    async fn poll(&mut self, tx: &PendingTransaction, head: u64) -> Result<(), EngineError> {
        let confirmed = self.chain.nonce_at(&tx.from).await?;
        if let Some(receipt) = self.find_receipt(tx).await? {
            return self.on_receipt(tx, receipt).await;
        }
        if confirmed > tx.nonce {
            return self.fatal(&tx.id, format!("nonce {} consumed by another transaction", tx.nonce)).await;
        }
        if head.saturating_sub(tx.last_broadcast_head) >= self.config.stuck_after_heads {
            self.bump(tx, head).await?;
        }
        Ok(())
    }

    async fn bump(&mut self, tx: &PendingTransaction, head: u64) -> Result<(), EngineError> {
        let fee = self.config.bumped_fee(tx.fee);
        if fee <= tx.fee {
            self.store().record(Event::TxRebroadcast {
                id: tx.id.clone(),
                fee: tx.fee,
                tx_hash: tx.tx_hash.clone(),
                raw: tx.raw.clone(),
                at_head: head,
                resubmission: false,
            })?;
            debug!(tx = %tx.id, fee, head, "fee at cap, rebroadcasting as is");
            self.send(tx, &tx.raw).await;
            return Ok(());
        }
        let signed = self.signer.sign(&UnsignedTx { fee, ..tx.unsigned() }).await?;
        self.store().record(Event::TxRebroadcast {
            id: tx.id.clone(),
            fee,
            tx_hash: signed.hash.clone(),
            raw: signed.raw.clone(),
            at_head: head,
            resubmission: false,
        })?;
        warn!(tx = %tx.id, nonce = tx.nonce, old_fee = tx.fee, fee, hash = %signed.hash, "transaction stuck, fee bumped");
        self.send(tx, &signed.raw).await;
        Ok(())
    }

    /// Depth check for an included transaction
    async fn check_depth(&mut self, tx: &PendingTransaction) -> Result<(), EngineError> {
        let Some(inclusion) = &tx.inclusion else { return Ok(()) };
        match self.tracker.confirmations_of(&inclusion.block_hash) {
            Confirmations::Known(depth) if depth >= tx.required_confirmations => self.confirm(&tx.id).await,
            Confirmations::Known(_) => Ok(()),
            Confirmations::Unknown => {
                // Inclusion block is outside the view: ask the chain again
                match self.find_receipt(tx).await? {
                    Some(receipt) if receipt.block_hash != inclusion.block_hash => self.on_receipt(tx, receipt).await,
                    Some(receipt) => {
                        let depth = self.tracker.top_number().saturating_sub(receipt.block_number);
                        let below_view = self.tracker.floor().is_some_and(|floor| receipt.block_number < floor);
                        if below_view && depth >= tx.required_confirmations {
                            self.confirm(&tx.id).await
                        } else {
                            Ok(())
                        }
                    }
                    None => {
                        self.store().record(Event::TxInvalidated { id: tx.id.clone() })?;
                        warn!(tx = %tx.id, "receipt vanished, resubmitting");
                        self.resubmit(tx).await
                    }
                }
            }
        }
    }

    async fn find_receipt(&self, tx: &PendingTransaction) -> Result<Option<Receipt>, EngineError> {
        for hash in tx.all_hashes() {
            if let Some(receipt) = self.chain.receipt(hash).await? {
                return Ok(Some(receipt));
            }
        }
        Ok(None)
    }

    async fn on_receipt(&mut self, tx: &PendingTransaction, receipt: Receipt) -> Result<(), EngineError> {
        if !receipt.success {
            let reason = format!("transaction {} reverted in block {}", receipt.tx_hash, receipt.block_number);
            return self.fatal(&tx.id, reason).await;
        }
        let inclusion = Inclusion {
            block_hash: receipt.block_hash.clone(),
            block_number: receipt.block_number,
            tx_hash: receipt.tx_hash.clone(),
        };
        if tx.inclusion.as_ref() != Some(&inclusion) {
            self.store().record(Event::TxIncluded { id: tx.id.clone(), inclusion })?;
            info!(tx = %tx.id, block = receipt.block_number, hash = %receipt.tx_hash, "transaction included");
        }
        self.tracker.watch(receipt.block_hash.clone(), tx.required_confirmations);
        match self.tracker.confirmations_of(&receipt.block_hash) {
            Confirmations::Known(depth) if depth >= tx.required_confirmations => self.confirm(&tx.id).await,
            _ => Ok(()),
        }
    }

    async fn confirm(&mut self, id: &TxId) -> Result<(), EngineError> {
        self.store().record(Event::TxConfirmed { id: id.clone() })?;
        info!(tx = %id, "transaction confirmed");
        self.finish(id).await
    }

    async fn fatal(&mut self, id: &TxId, reason: String) -> Result<(), EngineError> {
        warn!(tx = %id, reason = %reason, "transaction fatal");
        self.store().record(Event::TxFatal { id: id.clone(), error: reason })?;
        self.finish(id).await
    }

    /// Report a Confirmed or Fatal transaction to its Run, then archive it.
    /// A Run that moved on in the meantime only gets the archive.
    async fn finish(&mut self, id: &TxId) -> Result<(), EngineError> {
        let Some(tx) = self.store().tx(id) else { return Ok(()) };
        let outcome = match (tx.status, &tx.inclusion) {
            (TxStatus::Confirmed, Some(inclusion)) => {
                let output = Value::Map(BTreeMap::from([
                    ("tx_hash".to_string(), Value::Text(inclusion.tx_hash.to_string())),
                    ("block_number".to_string(), Value::Number(inclusion.block_number as f64)),
                ]));
                let confirmed = ConfirmedTx {
                    tx_id: tx.id.clone(),
                    tx_hash: inclusion.tx_hash.clone(),
                    block_number: inclusion.block_number,
                };
                let job = self.store().run(&tx.run_id).and_then(|run| self.store().job(&run.job_id));
                match job {
                    Some(job) => self.runs.confirm(&job, &tx.run_id, &tx.task_id, output, confirmed),
                    None => Err(EngineError::UnknownRun(tx.run_id.clone())),
                }
            }
            (TxStatus::Fatal, _) => {
                let message = tx.error.clone().unwrap_or_else(|| "transaction failed".to_string());
                let cause = RunError::new(ErrorKind::ChainConsistency, message).in_task(&tx.task_id);
                self.runs.fail(&tx.run_id, cause)
            }
            _ => return Ok(()),
        };
        match outcome {
            Ok(run) if run.status == RunStatus::InProgress => {
                if self.resume.send(run.id.clone()).await.is_err() {
                    debug!(run = %run.id, "resume receiver dropped");
                }
            }
            Ok(_) => {}
            Err(e) if run_moved_on(&e) => info!(tx = %id, run = %tx.run_id, error = %e, "run moved on before transaction settled"),
            Err(e) => return Err(e),
        }
        self.store().record(Event::TxArchived { id: id.clone() })?;
        debug!(tx = %id, status = %tx.status, "transaction archived");
        Ok(())
    }

    /// Send bytes for `tx`. Failures are left to the next head's receipt
    /// and nonce checks.
    async fn send(&self, tx: &PendingTransaction, raw: &[u8]) {
        match self.chain.send_transaction(raw).await {
            Ok(hash) => debug!(tx = %tx.id, %hash, "broadcast"),
            Err(ChainError::AlreadyKnown) => debug!(tx = %tx.id, "node already has transaction"),
            Err(ChainError::NonceTooLow) => warn!(tx = %tx.id, nonce = tx.nonce, "nonce already used on chain"),
            Err(e) => warn!(tx = %tx.id, error = %e, "broadcast failed"),
        }
    }
}

fn run_moved_on(e: &EngineError) -> bool {
    match e {
        EngineError::UnknownRun(_) => true,
        EngineError::Store(s) => s.is_conflict() || matches!(s, StoreError::NoPendingTask { .. }),
        _ => false,
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
