// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger deduplication and task pipeline ordering

use crate::prelude::*;
use orc_core::{TriggerFns, TxHash};
use similar_asserts::assert_eq;

fn log_event() -> TriggerEvent {
    TriggerEvent::Log {
        tx_hash: TxHash::new(format!("0x{:064x}", 0xabc)),
        block_number: 100,
        log_index: 3,
        data: Value::Number(7.0),
    }
}

#[tokio::test]
async fn the_same_log_triggers_one_run() {
    let h = Harness::new(registry());
    let job = JobSpec::new(
        "job-log",
        TriggerSpec::Log { address: TARGET.to_string(), topics: vec![] },
        vec![TaskSpec::new("echo", "noop")],
    );
    h.node.register_job(job).unwrap();
    h.start().await;

    let first = h.node.trigger(&JobId::from("job-log"), log_event()).unwrap();
    let second = h.node.trigger(&JobId::from("job-log"), log_event()).unwrap();

    assert_eq!(first.run_id(), second.run_id());
    let runs = h.node.runs_for_job(&JobId::from("job-log"));
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].idempotency_key, format!("log:0x{:064x}:block100:idx3", 0xabc));

    let run_id = runs[0].id.clone();
    h.wait_status(&run_id, RunStatus::Completed).await;
    h.node.shutdown().await.unwrap();
}

#[tokio::test]
async fn mined_matching_log_creates_exactly_one_run() {
    const FEED: &str = "0x00000000000000000000000000000000000000f1";
    const ROUND: &str = "0x0109fc6f55cf40689f02fbaad7af7fe7bbac8a3d2186600afc7d3e10cac60271";
    let h = Harness::new(registry());
    let job = JobSpec::new(
        "job-log",
        TriggerSpec::Log { address: FEED.to_string(), topics: vec![ROUND.to_string()] },
        vec![TaskSpec::new("echo", "noop")],
    );
    h.node.register_job(job).unwrap();
    h.start().await;
    let job_id = JobId::from("job-log");

    let tx_hash = h.chain.emit_log(FEED, &[ROUND], &[0x07]);
    h.chain.emit_log(FEED, &["0xbeef"], &[]);
    h.chain.emit_log(TARGET, &[ROUND], &[]);
    let block = h.mine().await;
    wait_for("log run", || !h.node.runs_for_job(&job_id).is_empty()).await;

    // Later heads rescan nothing old
    h.mine_n(3).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let runs = h.node.runs_for_job(&job_id);
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].idempotency_key, format!("log:{tx_hash}:block{}:idx0", block.number));
    assert_eq!(runs[0].trigger.get("data"), Some(&Value::Bytes(vec![0x07])));
    h.wait_status(&runs[0].id, RunStatus::Completed).await;
    h.node.shutdown().await.unwrap();
}

#[tokio::test]
async fn retried_task_keeps_task_runs_in_order() {
    let flaky = ScriptedTask::flaky(2);
    let mut registry = TaskRegistry::builtin();
    registry.register("a", ScriptedTask::value(1.0));
    registry.register("b", flaky.clone());
    registry.register("c", ScriptedTask::echo());
    let h = Harness::new(registry);
    h.node
        .register_job(JobSpec::new(
            "job-abc",
            TriggerSpec::Web,
            vec![
                TaskSpec::new("a", "a"),
                TaskSpec::new("b", "b").retry(quick_retry(3)),
                TaskSpec::new("c", "c"),
            ],
        ))
        .unwrap();
    h.start().await;

    let run_id = h.web("job-abc", "req-1");
    h.wait_status(&run_id, RunStatus::Completed).await;

    let run = h.node.run(&run_id).unwrap();
    let order: Vec<_> = run.task_runs.iter().map(|tr| tr.task_id.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
    assert!(run.task_runs.iter().all(|tr| tr.status == TaskRunStatus::Completed));
    assert_eq!(run.task_runs[1].attempts, 3);
    assert_eq!(flaky.call_count(), 3);
    assert_eq!(run.latest_output(), &Value::Number(1.0));
    h.node.shutdown().await.unwrap();
}

#[tokio::test]
async fn validation_error_fails_the_run_without_retry() {
    let broken = ScriptedTask::new(vec![ScriptStep::Fail(TaskError::validation("bad input"))]);
    let mut registry = TaskRegistry::builtin();
    registry.register("broken", broken.clone());
    let h = Harness::new(registry);
    h.node
        .register_job(JobSpec::new(
            "job-broken",
            TriggerSpec::Web,
            vec![TaskSpec::new("parse", "broken").retry(quick_retry(5)), TaskSpec::new("after", "noop")],
        ))
        .unwrap();
    h.start().await;

    let run_id = h.web("job-broken", "req-1");
    h.wait_status(&run_id, RunStatus::Errored).await;

    let run = h.node.run(&run_id).unwrap();
    let error = run.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Validation);
    assert_eq!(error.task_id.as_deref(), Some("parse"));
    assert_eq!(run.task_runs.len(), 1);
    assert_eq!(run.task_runs[0].status, TaskRunStatus::Errored);
    assert_eq!(broken.call_count(), 1);
    h.node.shutdown().await.unwrap();
}

#[tokio::test]
async fn deviation_trigger_only_fires_past_the_threshold() {
    let h = Harness::new(registry());
    let functions = TriggerFns::from_json(&serde_json::json!({ "relativeThreshold": 0.05 })).unwrap();
    h.node
        .register_job(JobSpec::new(
            "job-feed",
            TriggerSpec::Deviation { functions, every: None },
            vec![TaskSpec::new("echo", "noop")],
        ))
        .unwrap();
    let job = JobId::from("job-feed");
    let observe = |round: &str, value: f64| {
        h.node.trigger(
            &job,
            TriggerEvent::Deviation { job_id: job.clone(), round_id: round.to_string(), value },
        )
    };

    // No reported value yet
    assert!(matches!(observe("1", 100.0).unwrap(), Triggered::Run(_)));
    // 3% move
    match observe("2", 103.0).unwrap() {
        Triggered::BelowThreshold { last, value } => {
            assert_eq!(last, 100.0);
            assert_eq!(value, 103.0);
        }
        other => panic!("expected below threshold, got run {:?}", other.run_id()),
    }
    // 6% from the last reported value, not from the skipped observation
    assert!(matches!(observe("3", 106.0).unwrap(), Triggered::Run(_)));
    assert_eq!(h.node.runs_for_job(&job).len(), 2);
}

#[tokio::test]
async fn unavailable_store_refuses_new_runs() {
    let h = Harness::new(registry());
    h.node.register_job(test_support::web_job("job-web", &["noop"])).unwrap();
    h.start().await;

    h.node.store().set_available(false);
    let event = TriggerEvent::Web { request_id: "req-1".into(), body: Value::Null };
    assert!(matches!(h.node.trigger(&JobId::from("job-web"), event.clone()), Err(EngineError::Backpressure)));
    assert!(h.node.runs_for_job(&JobId::from("job-web")).is_empty());

    h.node.store().set_available(true);
    let run_id = h.node.trigger(&JobId::from("job-web"), event).unwrap().run_id().cloned().unwrap();
    h.wait_status(&run_id, RunStatus::Completed).await;
    h.node.shutdown().await.unwrap();
}
