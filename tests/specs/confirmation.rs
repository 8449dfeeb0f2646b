// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transaction confirmation: depth, reorgs, stuck and replaced transactions

use crate::prelude::*;
use similar_asserts::assert_eq;

async fn parked(h: &Harness, job: JobSpec) -> RunId {
    let id = job.id.clone();
    h.node.register_job(job).unwrap();
    h.start().await;
    let run_id = h.web(id.as_str(), "req-1");
    h.wait_status(&run_id, RunStatus::PendingConfirmation).await;
    wait_for("broadcast", || h.chain.mempool().len() == 1).await;
    run_id
}

async fn included(h: &Harness, run_id: &RunId) -> u64 {
    wait_for("inclusion", || h.tx(run_id, "submit").is_included()).await;
    h.tx(run_id, "submit").inclusion.map(|i| i.block_number).unwrap()
}

#[tokio::test]
async fn confirms_only_at_required_depth() {
    let h = Harness::new(registry());
    let run_id = parked(&h, report_job("job-report", 3)).await;

    let block = h.mine().await;
    assert_eq!(included(&h, &run_id).await, block.number);

    h.mine_n(2).await;
    assert_eq!(h.status(&run_id), RunStatus::PendingConfirmation);

    let tip = h.mine().await;
    h.wait_status(&run_id, RunStatus::Completed).await;
    assert_eq!(tip.number, block.number + 3);

    let run = h.node.run(&run_id).unwrap();
    let confirmed = run.task_runs[1].confirmed_tx.clone().unwrap();
    assert_eq!(confirmed.block_number, block.number);
    assert_eq!(h.tx(&run_id, "submit").status, TxStatus::Confirmed);
    assert!(h.node.pending_transactions().is_empty());
    h.node.shutdown().await.unwrap();
}

#[tokio::test]
async fn discarded_inclusion_resubmits_once_with_the_same_nonce() {
    let h = Harness::new(registry());
    let run_id = parked(&h, report_job("job-report", 3)).await;
    h.mine().await;
    included(&h, &run_id).await;
    let original = h.tx(&run_id, "submit");

    // Replacement blocks leave the transaction in the mempool
    let tip = h.chain.reorg(1, 2);
    h.admitted(&tip).await;
    wait_for("resubmission", || h.tx(&run_id, "submit").resubmissions == 1).await;

    let tx = h.tx(&run_id, "submit");
    assert_eq!(tx.inclusion, None);
    assert_eq!(tx.nonce, original.nonce);
    assert_eq!(tx.tx_hash, original.tx_hash);
    assert_eq!(h.status(&run_id), RunStatus::PendingConfirmation);

    let block = h.mine().await;
    assert_eq!(included(&h, &run_id).await, block.number);
    h.mine_n(3).await;
    h.wait_status(&run_id, RunStatus::Completed).await;
    assert_eq!(h.tx(&run_id, "submit").resubmissions, 1);
    h.node.shutdown().await.unwrap();
}

#[tokio::test]
async fn stuck_transaction_is_rebroadcast_with_a_higher_fee() {
    let config = CoordinatorConfig { stuck_after_heads: 2, ..CoordinatorConfig::default() };
    let h = Harness::build(FakeChain::with_height(5), Store::in_memory(), registry(), config.clone());
    h.chain.set_auto_include(false);
    let run_id = parked(&h, report_job("job-report", 1)).await;
    let first = h.tx(&run_id, "submit");

    h.mine_n(2).await;
    wait_for("fee bump", || h.tx(&run_id, "submit").fee_bumps == 1).await;

    let bumped = h.tx(&run_id, "submit");
    assert_eq!(bumped.nonce, first.nonce);
    assert_eq!(bumped.fee, config.bumped_fee(first.fee));
    assert_ne!(bumped.tx_hash, first.tx_hash);
    wait_for("replacement in mempool", || {
        h.chain.mempool().first().is_some_and(|tx| tx.fee == bumped.fee)
    })
    .await;
    assert_eq!(h.chain.mempool().len(), 1);

    h.chain.set_auto_include(true);
    h.mine().await;
    included(&h, &run_id).await;
    h.mine().await;
    h.wait_status(&run_id, RunStatus::Completed).await;
    assert_eq!(h.tx(&run_id, "submit").inclusion.map(|i| i.tx_hash), Some(bumped.tx_hash));
    h.node.shutdown().await.unwrap();
}

#[tokio::test]
async fn nonce_taken_by_a_replacement_after_reorg_is_fatal() {
    let h = Harness::new(registry());
    let run_id = parked(&h, report_job("job-report", 3)).await;
    h.mine().await;
    included(&h, &run_id).await;
    let nonce = h.tx(&run_id, "submit").nonce;

    h.chain.consume_nonce(SENDER, nonce);
    let tip = h.chain.reorg_including(1, 1);
    h.admitted(&tip).await;
    h.wait_status(&run_id, RunStatus::Errored).await;

    let error = h.node.run(&run_id).unwrap().error.unwrap();
    assert_eq!(error.kind, ErrorKind::ChainConsistency);
    assert_eq!(error.task_id.as_deref(), Some("submit"));
    assert_eq!(h.tx(&run_id, "submit").status, TxStatus::Fatal);
    wait_for("archive", || h.node.pending_transactions().is_empty()).await;
    h.node.shutdown().await.unwrap();
}
