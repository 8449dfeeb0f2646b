// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable stores: restart recovery and the full oracle flow

use crate::prelude::*;
use orc_storage::Wal;
use similar_asserts::assert_eq;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn paths(dir: &Path) -> (PathBuf, PathBuf) {
    let wal = dir.join("wal").join("events.wal");
    std::fs::create_dir_all(wal.parent().unwrap()).unwrap();
    (wal, dir.join("snapshot.zst"))
}

fn open_store(dir: &Path) -> Store {
    let (wal, snapshot) = paths(dir);
    Store::open(&wal, &snapshot).unwrap()
}

fn two_step_job() -> JobSpec {
    JobSpec::new("job-ab", TriggerSpec::Web, vec![TaskSpec::new("a", "a"), TaskSpec::new("b", "b")])
}

#[tokio::test]
async fn restart_resumes_after_the_last_persisted_task() {
    let dir = tempdir().unwrap();

    let first_a = ScriptedTask::value(5.0);
    let stalled_b = ScriptedTask::new(vec![ScriptStep::Hang]);
    let mut registry = TaskRegistry::builtin();
    registry.register("a", first_a.clone());
    registry.register("b", stalled_b.clone());
    let h = Harness::build(FakeChain::new(), open_store(dir.path()), registry, CoordinatorConfig::default());
    h.node.register_job(two_step_job()).unwrap();
    h.start().await;

    let run_id = h.web("job-ab", "req-1");
    wait_for("task b to start", || stalled_b.call_count() == 1).await;
    assert_eq!(h.node.run(&run_id).unwrap().task_runs.len(), 1);
    // Process goes away while b is running
    h.node.shutdown().await.unwrap();
    drop(h);

    let second_a = ScriptedTask::value(99.0);
    let working_b = ScriptedTask::echo();
    let mut registry = TaskRegistry::builtin();
    registry.register("a", second_a.clone());
    registry.register("b", working_b.clone());
    let h = Harness::build(FakeChain::new(), open_store(dir.path()), registry, CoordinatorConfig::default());
    assert_eq!(h.status(&run_id), RunStatus::InProgress);
    h.start().await;
    h.wait_status(&run_id, RunStatus::Completed).await;

    assert_eq!(first_a.call_count(), 1);
    assert_eq!(second_a.call_count(), 0);
    assert_eq!(working_b.call_count(), 1);
    let run = h.node.run(&run_id).unwrap();
    let order: Vec<_> = run.task_runs.iter().map(|tr| tr.task_id.as_str()).collect();
    assert_eq!(order, vec!["a", "b"]);
    assert_eq!(run.latest_output(), &Value::Number(5.0));
    h.node.shutdown().await.unwrap();
}

#[tokio::test]
async fn restart_keeps_tracking_a_broadcast_transaction() {
    let dir = tempdir().unwrap();
    let chain = FakeChain::with_height(5);

    let h = Harness::build(chain.clone(), open_store(dir.path()), registry(), CoordinatorConfig::default());
    h.node.register_job(report_job("job-report", 2)).unwrap();
    h.start().await;
    let run_id = h.web("job-report", "req-1");
    h.wait_status(&run_id, RunStatus::PendingConfirmation).await;
    wait_for("broadcast", || chain.mempool().len() == 1).await;
    let tx = h.tx(&run_id, "submit");
    h.node.shutdown().await.unwrap();
    drop(h);

    // Included while nobody was watching
    let block = chain.mine();

    let h = Harness::build(chain.clone(), open_store(dir.path()), registry(), CoordinatorConfig::default());
    h.start().await;
    wait_for("inclusion", || h.tx(&run_id, "submit").is_included()).await;
    assert_eq!(h.tx(&run_id, "submit").inclusion.map(|i| i.block_number), Some(block.number));
    h.mine_n(2).await;
    h.wait_status(&run_id, RunStatus::Completed).await;

    // One broadcast, one nonce
    assert_eq!(chain.sent().len(), 1);
    assert_eq!(h.tx(&run_id, "submit").nonce, tx.nonce);
    h.node.shutdown().await.unwrap();
}

#[tokio::test]
async fn inclusion_reorged_out_while_stopped_is_resubmitted_on_restart() {
    let dir = tempdir().unwrap();
    let chain = FakeChain::with_height(5);

    let h = Harness::build(chain.clone(), open_store(dir.path()), registry(), CoordinatorConfig::default());
    h.node.register_job(report_job("job-report", 3)).unwrap();
    h.start().await;
    let run_id = h.web("job-report", "req-1");
    h.wait_status(&run_id, RunStatus::PendingConfirmation).await;
    wait_for("broadcast", || chain.mempool().len() == 1).await;
    h.mine().await;
    wait_for("inclusion", || h.tx(&run_id, "submit").is_included()).await;
    let original = h.tx(&run_id, "submit");
    h.node.shutdown().await.unwrap();
    drop(h);

    // The inclusion block is replaced while the node is down
    chain.reorg(1, 2);
    assert_eq!(chain.mempool().len(), 1);

    let h = Harness::build(chain.clone(), open_store(dir.path()), registry(), CoordinatorConfig::default());
    h.start().await;
    wait_for("resubmission", || h.tx(&run_id, "submit").resubmissions == 1).await;

    let tx = h.tx(&run_id, "submit");
    assert_eq!(tx.inclusion, None);
    assert_eq!(tx.nonce, original.nonce);
    assert_eq!(tx.tx_hash, original.tx_hash);
    assert_eq!(h.status(&run_id), RunStatus::PendingConfirmation);

    let block = h.mine().await;
    wait_for("re-inclusion", || h.tx(&run_id, "submit").is_included()).await;
    assert_eq!(h.tx(&run_id, "submit").inclusion.map(|i| i.block_number), Some(block.number));
    h.mine_n(3).await;
    h.wait_status(&run_id, RunStatus::Completed).await;
    assert_eq!(h.tx(&run_id, "submit").resubmissions, 1);
    h.node.shutdown().await.unwrap();
}

#[tokio::test]
async fn fetch_multiply_submit_completes_after_two_confirmations() {
    let dir = tempdir().unwrap();
    let (wal_path, _) = paths(dir.path());
    let url = serve_json("2000").await;

    let h = Harness::build(
        FakeChain::with_height(5),
        open_store(dir.path()),
        TaskRegistry::builtin(),
        CoordinatorConfig::default(),
    );
    h.node
        .register_job(JobSpec::new(
            "job-eth-usd",
            TriggerSpec::Web,
            vec![
                TaskSpec::new("fetch", "http_fetch").param("url", url),
                TaskSpec::new("scale", "multiply").param("times", 100),
                submit_task("submit", 2),
            ],
        ))
        .unwrap();
    h.start().await;

    let run_id = h.web("job-eth-usd", "req-1");
    h.wait_status(&run_id, RunStatus::PendingConfirmation).await;
    wait_for("broadcast", || h.chain.mempool().len() == 1).await;

    let tx = h.tx(&run_id, "submit");
    assert_eq!(tx.to, TARGET);
    assert_eq!(&tx.data[..4], &[0x12, 0x34, 0x56, 0x78]);
    assert_eq!(&tx.data[4..], &{
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&200_000u64.to_be_bytes());
        word
    }[..]);

    let block = h.mine().await;
    wait_for("inclusion", || h.tx(&run_id, "submit").is_included()).await;
    h.mine().await;
    assert_eq!(h.status(&run_id), RunStatus::PendingConfirmation);
    let tip = h.mine().await;
    h.wait_status(&run_id, RunStatus::Completed).await;
    assert_eq!(tip.number, block.number + 2);

    let run = h.node.run(&run_id).unwrap();
    let outputs: Vec<_> = run.task_runs.iter().map(|tr| tr.output.clone()).collect();
    assert_eq!(outputs[0], Value::Number(2000.0));
    assert_eq!(outputs[1], Value::Number(200_000.0));
    assert_eq!(run.task_runs[2].confirmed_tx.as_ref().map(|c| c.block_number), Some(block.number));
    h.node.shutdown().await.unwrap();

    let entries = Wal::open(&wal_path, 0).unwrap().entries_after(0).unwrap();
    assert_eq!(
        status_history(&entries, &run_id),
        vec![
            RunStatus::Unstarted,
            RunStatus::InProgress,
            RunStatus::PendingConfirmation,
            RunStatus::Completed,
        ]
    );
}
