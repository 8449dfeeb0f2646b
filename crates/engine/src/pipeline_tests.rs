// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{quick_retry, wait_for, wait_for_status};
use orc_adapters::{ScriptStep, ScriptedTask};
use orc_core::{ErrorKind, FakeClock, RetryPolicy, TaskRunStatus, TriggerEvent, TriggerSpec};
use orc_storage::Store;
use std::time::Duration;

struct Fixture {
    store: Store,
    executor: Executor<FakeClock>,
    submissions: mpsc::Receiver<Submission>,
    shutdown: CancellationToken,
}

fn fixture(tasks: &[(&str, ScriptedTask)], workers: usize) -> Fixture {
    let store = Store::in_memory();
    let mut registry = TaskRegistry::builtin();
    for (kind, task) in tasks {
        registry.register(*kind, task.clone());
    }
    let (tx, submissions) = mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let runs = RunMachine::new(store.clone(), FakeClock::new());
    let executor = Executor::new(runs, registry, &ExecutorConfig { workers }, tx, shutdown.clone());
    Fixture { store, executor, submissions, shutdown }
}

fn job(id: &str, tasks: Vec<TaskSpec>) -> JobSpec {
    JobSpec::new(id, TriggerSpec::Web, tasks)
}

fn task(id: &str, kind: &str) -> TaskSpec {
    TaskSpec::new(id, kind).retry(quick_retry(3))
}

fn new_run(f: &Fixture, job: &JobSpec, request: &str) -> RunId {
    f.store.register_job(job.clone()).unwrap();
    let trigger = TriggerEvent::Web { request_id: request.to_string(), body: Value::Number(2.0) };
    RunMachine::new(f.store.clone(), FakeClock::new()).create_run(&job.id, &trigger).unwrap().into_run().id
}

fn tx_request() -> TxRequest {
    TxRequest { to: "0xfeed".to_string(), data: vec![0xde, 0xad, 0xbe, 0xef] }
}

#[tokio::test]
async fn outputs_flow_from_task_to_task() {
    let f = fixture(&[("echo", ScriptedTask::echo())], 1);
    let job = job("job-a", vec![task("a", "echo"), task("b", "multiply").param("times", 3), task("c", "echo")]);
    let id = new_run(&f, &job, "r1");

    let status = f.executor.drive(&id).await.unwrap();
    assert_eq!(status, RunStatus::Completed);

    let run = f.store.run(&id).unwrap();
    let ids: Vec<&str> = run.task_runs.iter().map(|tr| tr.task_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(run.task_runs[0].input, Value::Number(2.0));
    assert_eq!(run.task_runs[1].output, Value::Number(6.0));
    assert_eq!(run.task_runs[2].output, Value::Number(6.0));
}

#[tokio::test]
async fn transient_failures_retry_without_gaps() {
    let flaky = ScriptedTask::flaky(2);
    let f = fixture(&[("echo", ScriptedTask::echo()), ("flaky", flaky.clone())], 1);
    let job = job("job-a", vec![task("a", "echo"), task("b", "flaky"), task("c", "echo")]);
    let id = new_run(&f, &job, "r1");

    assert_eq!(f.executor.drive(&id).await.unwrap(), RunStatus::Completed);
    let run = f.store.run(&id).unwrap();
    let ids: Vec<&str> = run.task_runs.iter().map(|tr| tr.task_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(run.task_runs[1].attempts, 3);
    assert_eq!(flaky.call_count(), 3);
    let attempts: Vec<u32> = flaky.calls().iter().map(|c| c.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
}

#[tokio::test]
async fn exhausted_retries_fail_the_run() {
    let f = fixture(&[("flaky", ScriptedTask::flaky(5))], 1);
    let job = job("job-a", vec![task("a", "flaky").retry(quick_retry(2)), task("b", "noop")]);
    let id = new_run(&f, &job, "r1");

    assert_eq!(f.executor.drive(&id).await.unwrap(), RunStatus::Errored);
    let run = f.store.run(&id).unwrap();
    let error = run.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Transient);
    assert_eq!(error.task_id.as_deref(), Some("a"));
    assert_eq!(run.task_runs.len(), 1);
    assert_eq!(run.task_runs[0].status, TaskRunStatus::Errored);
    assert_eq!(run.task_runs[0].attempts, 2);
}

#[tokio::test]
async fn validation_errors_are_not_retried() {
    let bad = ScriptedTask::new(vec![ScriptStep::Fail(TaskError::validation("wrong input shape"))]);
    let f = fixture(&[("bad", bad.clone())], 1);
    let job = job("job-a", vec![task("a", "bad")]);
    let id = new_run(&f, &job, "r1");

    assert_eq!(f.executor.drive(&id).await.unwrap(), RunStatus::Errored);
    assert_eq!(bad.call_count(), 1);
    let error = f.store.run(&id).unwrap().error.unwrap();
    assert_eq!(error.kind, ErrorKind::Validation);
    assert_eq!(error.message, "wrong input shape");
}

#[tokio::test]
async fn unknown_task_type_fails_without_invocation() {
    let f = fixture(&[], 1);
    let job = job("job-a", vec![task("a", "nonexistent")]);
    let id = new_run(&f, &job, "r1");

    assert_eq!(f.executor.drive(&id).await.unwrap(), RunStatus::Errored);
    let error = f.store.run(&id).unwrap().error.unwrap();
    assert_eq!(error.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn hung_task_times_out_as_transient() {
    let hang = ScriptedTask::new(vec![ScriptStep::Hang]);
    let f = fixture(&[("hang", hang)], 1);
    let spec = TaskSpec::new("a", "hang").timeout(Duration::from_millis(20)).retry(quick_retry(1));
    let id = new_run(&f, &job("job-a", vec![spec]), "r1");

    assert_eq!(f.executor.drive(&id).await.unwrap(), RunStatus::Errored);
    let error = f.store.run(&id).unwrap().error.unwrap();
    assert_eq!(error.kind, ErrorKind::Transient);
    assert!(error.message.contains("timed out"), "{}", error.message);
}

#[tokio::test]
async fn transaction_output_parks_the_run() {
    let submit = ScriptedTask::new(vec![ScriptStep::Transaction(tx_request())]);
    let mut f = fixture(&[("submit", submit.clone())], 1);
    let job = job("job-a", vec![task("a", "noop"), task("b", "submit"), task("c", "noop")]);
    let id = new_run(&f, &job, "r1");

    assert_eq!(f.executor.drive(&id).await.unwrap(), RunStatus::PendingConfirmation);
    let submission = f.submissions.try_recv().unwrap();
    assert_eq!(submission.run_id, id);
    assert_eq!(submission.task_id, "b");
    assert_eq!(submission.request, tx_request());

    let run = f.store.run(&id).unwrap();
    let parked = run.pending_task_run().unwrap();
    assert_eq!(parked.pending_tx.as_ref(), Some(&submission.tx_id));
    assert_eq!(request_from_value(&parked.output), Some(tx_request()));

    // A parked Run is left alone
    assert_eq!(f.executor.drive(&id).await.unwrap(), RunStatus::PendingConfirmation);
    assert_eq!(submit.call_count(), 1);
    assert!(f.submissions.try_recv().is_err());
}

#[tokio::test]
async fn resumes_after_the_last_recorded_task() {
    let first = ScriptedTask::value(10.0);
    let rest = ScriptedTask::echo();
    let f = fixture(&[("first", first.clone()), ("rest", rest.clone())], 1);
    let job = job("job-a", vec![task("a", "first"), task("b", "rest"), task("c", "rest")]);
    let id = new_run(&f, &job, "r1");

    // State left by a previous process that recorded A and stopped
    let runs = RunMachine::new(f.store.clone(), FakeClock::new());
    runs.start(&id).unwrap();
    runs.advance(&job, &id, 0, TaskRun::completed("a", Value::Number(2.0), Value::Number(10.0))).unwrap();

    assert_eq!(f.executor.drive(&id).await.unwrap(), RunStatus::Completed);
    assert_eq!(first.call_count(), 0);
    assert_eq!(rest.call_count(), 2);
    assert_eq!(rest.calls()[0].input, Value::Number(10.0));
}

#[tokio::test]
async fn errored_task_run_without_terminal_status_is_finished() {
    let rest = ScriptedTask::echo();
    let f = fixture(&[("rest", rest.clone())], 1);
    let job = job("job-a", vec![task("a", "rest"), task("b", "rest")]);
    let id = new_run(&f, &job, "r1");

    let runs = RunMachine::new(f.store.clone(), FakeClock::new());
    runs.start(&id).unwrap();
    let cause = RunError::new(ErrorKind::Transient, "gave up").in_task("a");
    runs.advance(&job, &id, 0, TaskRun::errored("a", Value::Null, cause.clone())).unwrap();

    assert_eq!(f.executor.drive(&id).await.unwrap(), RunStatus::Errored);
    assert_eq!(f.store.run(&id).unwrap().error, Some(cause));
    assert_eq!(rest.call_count(), 0);
}

#[tokio::test]
async fn cancelled_run_is_not_driven() {
    let echo = ScriptedTask::echo();
    let f = fixture(&[("echo", echo.clone())], 1);
    let id = new_run(&f, &job("job-a", vec![task("a", "echo")]), "r1");
    f.store.cancel_run(&id, 1).unwrap();

    assert_eq!(f.executor.drive(&id).await.unwrap(), RunStatus::Cancelled);
    assert_eq!(echo.call_count(), 0);
}

#[tokio::test]
async fn cancellation_between_retries_stops_the_run() {
    let failing = ScriptedTask::new(vec![ScriptStep::Fail(TaskError::transient("down"))]);
    let f = fixture(&[("failing", failing.clone())], 1);
    let slow = RetryPolicy { initial_backoff: Duration::from_millis(50), ..quick_retry(10) };
    let id = new_run(&f, &job("job-a", vec![TaskSpec::new("a", "failing").retry(slow)]), "r1");

    f.executor.execute(&id).unwrap();
    wait_for("first attempt", || failing.call_count() >= 1).await;
    f.store.cancel_run(&id, 1).unwrap();
    wait_for("worker to let go", || f.executor.active_count() == 0).await;

    let run = f.store.run(&id).unwrap();
    assert_eq!(run.status, RunStatus::Cancelled);
    assert!(run.task_runs.is_empty());
    assert!(failing.call_count() < 10);
}

#[tokio::test]
async fn unavailable_store_refuses_new_work() {
    let f = fixture(&[], 1);
    let id = new_run(&f, &job("job-a", vec![task("a", "noop")]), "r1");
    f.store.set_available(false);
    assert!(matches!(f.executor.execute(&id), Err(EngineError::Backpressure)));
    assert_eq!(f.executor.active_count(), 0);
}

#[tokio::test]
async fn shut_down_executor_refuses_work() {
    let f = fixture(&[], 1);
    let id = new_run(&f, &job("job-a", vec![task("a", "noop")]), "r1");
    f.shutdown.cancel();
    assert!(matches!(f.executor.execute(&id), Err(EngineError::Shutdown)));
}

#[tokio::test]
async fn worker_pool_bounds_concurrency() {
    let sleepy = ScriptedTask::new(vec![ScriptStep::Sleep(Duration::from_millis(20))]);
    let f = fixture(&[("sleepy", sleepy.clone())], 2);
    let job = job("job-a", vec![task("a", "sleepy"), task("b", "sleepy")]);
    let ids: Vec<RunId> = (0..5).map(|i| new_run(&f, &job, &format!("r{i}"))).collect();

    for id in &ids {
        f.executor.execute(id).unwrap();
    }
    for id in &ids {
        wait_for_status(&f.store, id, RunStatus::Completed).await;
    }
    assert!(sleepy.max_in_flight() <= 2, "saw {}", sleepy.max_in_flight());
    assert!(!sleepy.same_run_overlap());
    assert_eq!(sleepy.call_count(), 10);
}

#[tokio::test]
async fn repeated_execute_never_overlaps_one_run() {
    let sleepy = ScriptedTask::new(vec![ScriptStep::Sleep(Duration::from_millis(5))]);
    let f = fixture(&[("sleepy", sleepy.clone())], 4);
    let job = job("job-a", vec![task("a", "sleepy"), task("b", "sleepy"), task("c", "sleepy")]);
    let id = new_run(&f, &job, "r1");

    for _ in 0..5 {
        f.executor.execute(&id).unwrap();
    }
    wait_for_status(&f.store, &id, RunStatus::Completed).await;
    wait_for("worker to let go", || f.executor.active_count() == 0).await;
    assert!(!sleepy.same_run_overlap());
    assert_eq!(sleepy.call_count(), 3);
    assert_eq!(f.store.run(&id).unwrap().task_runs.len(), 3);
}

#[test]
fn request_value_rejects_other_shapes() {
    assert_eq!(request_from_value(&Value::Null), None);
    assert_eq!(request_from_value(&Value::from("0xfeed")), None);
    assert_eq!(request_from_value(&request_to_value(&tx_request())), Some(tx_request()));
}
