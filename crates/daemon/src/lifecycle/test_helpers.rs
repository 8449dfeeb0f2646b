// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for lifecycle tests

pub(super) use super::{startup_with, LifecycleError};

pub(super) use orc_adapters::{EnvelopeSigner, FakeChain};
pub(super) use orc_core::{JobId, RunStatus, Value};
pub(super) use tempfile::tempdir;

use super::Daemon;
use crate::config::{ChainConfig, Config};
use orc_core::TriggerEvent;
use orc_engine::{CoordinatorConfig, ExecutorConfig, LogConfig};
use std::path::Path;
use std::time::Duration;

pub(super) const SENDER: &str = "0x00000000000000000000000000000000000000aa";

pub(super) const WEB_JOB: &str = r#"
id = "job-web"

[trigger]
type = "web"

[[tasks]]
id = "echo"
type = "noop"
"#;

pub(super) type TestDaemon = Daemon<FakeChain, EnvelopeSigner>;

pub(super) fn test_config(dir: &Path) -> Config {
    Config {
        state_dir: dir.join("state"),
        jobs_dir: dir.join("jobs"),
        chain: ChainConfig { sending_key: SENDER.to_string(), ..ChainConfig::default() },
        executor: ExecutorConfig::default(),
        coordinator: CoordinatorConfig { default_confirmations: 1, ..CoordinatorConfig::default() },
        logs: LogConfig { poll_interval: Duration::from_millis(5), ..LogConfig::default() },
    }
}

pub(super) fn write_job(config: &Config, file: &str, raw: &str) {
    std::fs::create_dir_all(&config.jobs_dir).unwrap();
    std::fs::write(config.jobs_dir.join(file), raw).unwrap();
}

pub(super) async fn start(config: &Config, chain: &FakeChain) -> TestDaemon {
    startup_with(config, chain.clone(), EnvelopeSigner::new(SENDER)).await.unwrap()
}

pub(super) fn web(request_id: &str) -> TriggerEvent {
    TriggerEvent::Web { request_id: request_id.to_string(), body: Value::Text("hello".into()) }
}

/// Poll `cond` every 5ms for up to two seconds
pub(super) async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}
