// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orc_core::test_support::{head, run_created_event};
use orc_core::{
    ConfirmedTx, ErrorKind, Inclusion, RunError, RunStatus, TaskRun, TxHash, TxStatus, Value,
};

fn state_with_run() -> MaterializedState {
    let mut state = MaterializedState::default();
    state.apply_event(&run_created_event("run-1", "job", "web:1"));
    state
}

fn run_id() -> RunId {
    RunId::from("run-1")
}

#[test]
fn duplicate_run_key_keeps_first_run() {
    let mut state = state_with_run();
    state.apply_event(&run_created_event("run-2", "job", "web:1"));
    assert_eq!(state.runs.len(), 1);
    assert_eq!(state.run_by_key("web:1").map(|r| r.id.as_str()), Some("run-1"));
}

#[test]
fn task_run_append_is_positional() {
    let mut state = state_with_run();
    let event = Event::RunTaskRecorded {
        id: run_id(),
        index: 0,
        task_run: TaskRun::completed("a", Value::Null, Value::from(1.0)),
    };
    state.apply_event(&event);
    state.apply_event(&event);
    assert_eq!(state.runs[&run_id()].task_runs.len(), 1);
}

#[test]
fn confirmation_completes_parked_task_run() {
    let mut state = state_with_run();
    let tx_id = TxId::from("ptx-1");
    state.apply_event(&Event::RunTaskRecorded {
        id: run_id(),
        index: 0,
        task_run: TaskRun::pending("submit", Value::Null, tx_id.clone()),
    });
    state.apply_event(&Event::RunTaskConfirmed {
        id: run_id(),
        task_id: "submit".into(),
        output: Value::from("0xfeed"),
        tx: ConfirmedTx { tx_id, tx_hash: TxHash::new("0xfeed"), block_number: 9 },
        at_ms: 5,
    });
    let tr = &state.runs[&run_id()].task_runs[0];
    assert_eq!(tr.status, orc_core::TaskRunStatus::Completed);
    assert_eq!(tr.confirmed_tx.as_ref().map(|c| c.block_number), Some(9));
    assert_eq!(tr.finished_at_ms, 5);
}

#[test]
fn errored_does_not_override_terminal_status() {
    let mut state = state_with_run();
    state.apply_event(&Event::RunStatusChanged { id: run_id(), status: RunStatus::Cancelled, at_ms: 7 });
    state.apply_event(&Event::RunErrored {
        id: run_id(),
        error: RunError::new(ErrorKind::Transient, "late"),
        at_ms: 8,
    });
    let run = &state.runs[&run_id()];
    assert_eq!(run.status, RunStatus::Cancelled);
    assert_eq!(run.finished_at_ms, Some(7));
    assert!(run.error.is_none());
}

#[test]
fn head_history_dedupes_and_discards() {
    let mut state = MaterializedState::default();
    for n in 1..=3 {
        state.apply_event(&Event::HeadObserved { head: head(n) });
    }
    state.apply_event(&Event::HeadObserved { head: head(3) });
    assert_eq!(state.heads.len(), 3);

    state.apply_event(&Event::HeadsDiscarded { hashes: vec![head(3).hash] });
    assert_eq!(state.heads.back().map(|h| h.number), Some(2));
    assert!(state.head_by_hash(&head(1).hash).is_some());
}

#[test]
fn head_history_is_capped() {
    let mut state = MaterializedState::default();
    for n in 1..=(HEAD_HISTORY_CAP as u64 + 10) {
        state.apply_event(&Event::HeadObserved { head: head(n) });
    }
    assert_eq!(state.heads.len(), HEAD_HISTORY_CAP);
    assert_eq!(state.heads.front().map(|h| h.number), Some(11));
}

#[test]
fn nonce_reservation_is_monotonic() {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::NonceReserved { key: "k".into(), nonce: 5 });
    state.apply_event(&Event::NonceReserved { key: "k".into(), nonce: 3 });
    assert_eq!(state.nonces["k"], 6);
}

fn pending_tx() -> PendingTransaction {
    PendingTransaction {
        id: TxId::from("ptx-1"),
        run_id: run_id(),
        task_id: "submit".into(),
        from: "0xfrom".into(),
        to: "0xto".into(),
        data: vec![1],
        nonce: 0,
        fee: 100,
        tx_hash: TxHash::new("0xaa"),
        raw: vec![1, 2, 3],
        submitted_at_head: 10,
        last_broadcast_head: 10,
        required_confirmations: 2,
        inclusion: None,
        status: TxStatus::Submitted,
        resubmissions: 0,
        fee_bumps: 0,
        prior_hashes: Vec::new(),
        created_at_ms: 0,
        error: None,
    }
}

#[test]
fn tx_lifecycle_through_reorg_and_archive() {
    let mut state = MaterializedState::default();
    let id = TxId::from("ptx-1");
    state.apply_event(&Event::TxSubmitted { tx: pending_tx() });
    state.apply_event(&Event::TxIncluded {
        id: id.clone(),
        inclusion: Inclusion {
            block_hash: BlockHash::new("0xb1"),
            block_number: 11,
            tx_hash: TxHash::new("0xt1"),
        },
    });
    assert!(state.txs[&id].is_included());

    state.apply_event(&Event::TxInvalidated { id: id.clone() });
    assert_eq!(state.txs[&id].status, TxStatus::Invalidated);
    assert!(state.txs[&id].inclusion.is_none());

    let rebroadcast = Event::TxRebroadcast {
        id: id.clone(),
        fee: 100,
        tx_hash: TxHash::new("0xaa"),
        raw: vec![1, 2, 3],
        at_head: 14,
        resubmission: true,
    };
    state.apply_event(&rebroadcast);
    state.apply_event(&rebroadcast);
    assert_eq!(state.txs[&id].resubmissions, 1);
    assert_eq!(state.txs[&id].status, TxStatus::Submitted);

    state.apply_event(&Event::TxConfirmed { id: id.clone() });
    state.apply_event(&Event::TxArchived { id: id.clone() });
    assert!(state.txs.is_empty());
    assert!(state.tx_for_task(&run_id(), "submit").is_some());

    // A replayed submission for an archived tx does not resurrect it
    state.apply_event(&Event::TxSubmitted { tx: pending_tx() });
    assert!(state.txs.is_empty());
}

#[test]
fn state_round_trips_through_json() {
    let mut state = state_with_run();
    state.apply_event(&Event::TxSubmitted { tx: pending_tx() });
    state.apply_event(&Event::FeedRecorded { job_id: JobId::from("job"), round_id: "1".into(), value: 3.5 });
    let json = serde_json::to_string(&state).unwrap();
    let back: MaterializedState = serde_json::from_str(&json).unwrap();
    assert_eq!(back.runs, state.runs);
    assert_eq!(back.txs, state.txs);
    assert_eq!(back.feeds, state.feeds);
}

#[test]
fn fee_bump_keeps_replaced_hash() {
    let mut state = MaterializedState::default();
    let id = TxId::from("ptx-1");
    state.apply_event(&Event::TxSubmitted { tx: pending_tx() });
    state.apply_event(&Event::TxRebroadcast {
        id: id.clone(),
        fee: 120,
        tx_hash: TxHash::new("0xbb"),
        raw: vec![4],
        at_head: 15,
        resubmission: false,
    });
    let tx = &state.txs[&id];
    assert_eq!(tx.fee_bumps, 1);
    assert_eq!(tx.prior_hashes, vec![TxHash::new("0xaa")]);
    let hashes: Vec<_> = tx.all_hashes().cloned().collect();
    assert_eq!(hashes, vec![TxHash::new("0xbb"), TxHash::new("0xaa")]);
}
