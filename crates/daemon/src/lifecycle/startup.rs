// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and initialization logic.

use std::io::Write;
use std::time::Instant;

use fs2::FileExt;
use orc_adapters::{ChainClient, EnvelopeSigner, Signer, TaskRegistry, WsRpcClient};
use orc_core::{RunStatus, SystemClock};
use orc_engine::{Node, NodeDeps};
use orc_storage::Store;
use tracing::{debug, info};

use super::{load_jobs, Daemon, LifecycleError};
use crate::config::Config;

/// Start the daemon against the configured websocket endpoint
pub async fn startup(config: &Config) -> Result<Daemon<WsRpcClient, EnvelopeSigner>, LifecycleError> {
    let chain = WsRpcClient::new(config.chain.ws_url.clone());
    let signer = EnvelopeSigner::new(config.chain.sending_key.clone());
    startup_with(config, chain, signer).await
}

/// Start the daemon with explicit chain and signer adapters
pub async fn startup_with<C: ChainClient, S: Signer>(
    config: &Config,
    chain: C,
    signer: S,
) -> Result<Daemon<C, S>, LifecycleError> {
    match startup_inner(config, chain, signer).await {
        Ok(daemon) => Ok(daemon),
        Err(e) => {
            // Without the lock, the PID file belongs to the running daemon
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

async fn startup_inner<C: ChainClient, S: Signer>(
    config: &Config,
    chain: C,
    signer: S,
) -> Result<Daemon<C, S>, LifecycleError> {
    // 1. Create state directory
    std::fs::create_dir_all(&config.state_dir)?;

    // 2. Acquire lock file FIRST - prevents two daemons sharing a WAL.
    // Open without truncating so a losing daemon cannot wipe the winner's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(config.lock_path())?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // 3. Load snapshot and replay the WAL
    let wal_path = config.wal_path();
    if let Some(parent) = wal_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Store::open(&wal_path, &config.snapshot_path())?;
    let (jobs, interrupted, pending_txs) = store.read(|s| {
        let interrupted = s
            .runs
            .values()
            .filter(|r| {
                matches!(
                    r.status,
                    RunStatus::Unstarted | RunStatus::InProgress | RunStatus::PendingConfirmation
                )
            })
            .count();
        (s.jobs.len(), interrupted, s.txs.len())
    });
    info!(jobs, interrupted, pending_txs, "recovered state");

    // 4. Build the engine and register job files
    let node = Node::new(
        NodeDeps { chain, signer, store, clock: SystemClock, registry: TaskRegistry::builtin() },
        config.engine_config(),
    );
    for job in load_jobs(&config.jobs_dir)? {
        let id = job.id.clone();
        if node.register_job(job)? {
            info!(job = %id, "registered job");
        } else {
            debug!(job = %id, "job unchanged");
        }
    }

    // 5. Spawn actors; this also resumes interrupted Runs
    node.start();

    info!(state_dir = %config.state_dir.display(), "daemon started");
    Ok(Daemon { config: config.clone(), lock_file, node, start_time: Instant::now() })
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    let lock_path = config.lock_path();
    if lock_path.exists() {
        let _ = std::fs::remove_file(&lock_path);
    }
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
