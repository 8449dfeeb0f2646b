// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the behavioral specs

#![allow(dead_code, unused_imports)]

pub use orc_adapters::{EnvelopeSigner, FakeChain, ScriptStep, ScriptedTask, TaskError, TaskRegistry};
pub use orc_core::test_support;
pub use orc_core::{
    ErrorKind, Event, FakeClock, Head, JobId, JobSpec, PendingTransaction, RetryPolicy, Run, RunId,
    RunStatus, TaskRunStatus, TaskSpec, TriggerEvent, TriggerSpec, TxStatus, Value,
};
pub use orc_engine::{
    CoordinatorConfig, EngineConfig, EngineError, ExecutorConfig, HeadEvent, HeadTracker, LogConfig,
    Node, NodeDeps, TrackerConfig, Triggered,
};
pub use orc_storage::Store;
pub use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const SENDER: &str = "0x00000000000000000000000000000000000000aa";
pub const TARGET: &str = "0x00000000000000000000000000000000000000ff";

pub type SpecNode = Node<FakeChain, EnvelopeSigner, FakeClock>;

pub struct Harness {
    pub chain: FakeChain,
    pub node: SpecNode,
}

impl Harness {
    pub fn new(registry: TaskRegistry) -> Self {
        Self::build(FakeChain::with_height(5), Store::in_memory(), registry, CoordinatorConfig::default())
    }

    pub fn build(chain: FakeChain, store: Store, registry: TaskRegistry, coordinator: CoordinatorConfig) -> Self {
        let deps = NodeDeps {
            chain: chain.clone(),
            signer: EnvelopeSigner::new(SENDER),
            store,
            clock: FakeClock::new(),
            registry,
        };
        let config = EngineConfig {
            tracker: TrackerConfig {
                reconnect_initial: Duration::from_millis(5),
                reconnect_max: Duration::from_millis(20),
                ..TrackerConfig::default()
            },
            coordinator,
            logs: LogConfig { poll_interval: Duration::from_millis(5), ..LogConfig::default() },
            ..EngineConfig::default()
        };
        Self { chain, node: Node::new(deps, config) }
    }

    /// Start the node and wait until it holds the current tip
    pub async fn start(&self) {
        self.node.start();
        let tip = self.chain.tip();
        wait_for("node to subscribe", || self.chain.subscribe_calls() >= 1).await;
        wait_for("node to catch up", || self.node.head().is_some_and(|h| h.number >= tip.number)).await;
    }

    /// Mine one block and wait until the node has admitted it
    pub async fn mine(&self) -> Head {
        let head = self.chain.mine();
        self.admitted(&head).await;
        head
    }

    pub async fn mine_n(&self, n: u64) -> Head {
        let mut last = self.chain.tip();
        for _ in 0..n {
            last = self.mine().await;
        }
        last
    }

    pub async fn admitted(&self, head: &Head) {
        wait_for(&format!("head {} to be admitted", head.number), || {
            self.node.head().is_some_and(|h| h.hash == head.hash)
        })
        .await;
    }

    pub fn web(&self, job: &str, request_id: &str) -> RunId {
        let event = TriggerEvent::Web { request_id: request_id.to_string(), body: Value::Null };
        self.node.trigger(&JobId::from(job), event).unwrap().run_id().cloned().unwrap()
    }

    pub fn status(&self, run_id: &RunId) -> RunStatus {
        self.node.run(run_id).unwrap().status
    }

    pub async fn wait_status(&self, run_id: &RunId, status: RunStatus) {
        wait_for(&format!("run {run_id} to reach {status}"), || {
            self.node.run(run_id).map(|r| r.status) == Some(status)
        })
        .await;
    }

    /// The transaction for `task_id`, whether still active or archived
    pub fn tx(&self, run_id: &RunId, task_id: &str) -> PendingTransaction {
        self.node
            .store()
            .read(|s| {
                s.txs
                    .values()
                    .chain(s.archived_txs.values())
                    .find(|tx| &tx.run_id == run_id && tx.task_id == task_id)
                    .cloned()
            })
            .unwrap()
    }
}

/// Poll `cond` every 5ms for up to five seconds
pub async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Retry policy with millisecond delays and no jitter
pub fn quick_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
        multiplier: 2.0,
        jitter: 0.0,
    }
}

pub fn submit_task(id: &str, confirmations: u64) -> TaskSpec {
    TaskSpec::new(id, "submit_tx")
        .param("to", TARGET)
        .param("selector", "0x12345678")
        .confirmations(confirmations)
}

/// A job that reports a fixed value on chain
pub fn report_job(id: &str, confirmations: u64) -> JobSpec {
    JobSpec::new(
        id,
        TriggerSpec::Web,
        vec![TaskSpec::new("price", "price"), submit_task("submit", confirmations)],
    )
}

/// Built-in tasks plus a `price` task returning 42
pub fn registry() -> TaskRegistry {
    let mut registry = TaskRegistry::builtin();
    registry.register("price", ScriptedTask::value(42.0));
    registry
}

/// Serve `body` to every HTTP request on a local port; returns the URL
pub async fn serve_json(body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = vec![0u8; 4096];
            let mut read = 0;
            while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf[read..]).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => read += n,
                }
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
        }
    });
    format!("http://{addr}/price")
}

/// Run statuses in the order the store recorded them
pub fn status_history(entries: &[orc_storage::WalEntry], run_id: &RunId) -> Vec<RunStatus> {
    let mut history = Vec::new();
    for entry in entries {
        match &entry.event {
            Event::RunCreated { run } if &run.id == run_id => history.push(run.status),
            Event::RunStatusChanged { id, status, .. } if id == run_id => history.push(*status),
            Event::RunErrored { id, .. } if id == run_id => history.push(RunStatus::Errored),
            _ => {}
        }
    }
    history
}
