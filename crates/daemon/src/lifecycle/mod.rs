// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, recovery.

mod jobs;
mod startup;
pub use jobs::load_jobs;
pub use startup::{startup, startup_with};

use std::fs::File;
use std::path::PathBuf;
use std::time::Instant;

use orc_adapters::{ChainClient, Signer};
use orc_core::{JobId, SystemClock};
use orc_engine::{EngineError, Node};
use orc_storage::StoreError;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, ConfigError};
use crate::env;

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Failed to parse job file {path}: {source}")]
    JobFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Job {id} is defined twice (second copy in {path})")]
    DuplicateJob { id: JobId, path: PathBuf },

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A running daemon
pub struct Daemon<C: ChainClient, S: Signer> {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub node: Node<C, S, SystemClock>,
    pub start_time: Instant,
}

impl<C: ChainClient, S: Signer> Daemon<C, S> {
    /// Stop the engine, then write a final checkpoint so the next startup
    /// does not have to replay the WAL.
    ///
    /// Workers get `ORC_DRAIN_TIMEOUT_MS` to finish their current step; on
    /// timeout the checkpoint is still written and interrupted Runs resume
    /// from their last persisted TaskRun on next start.
    pub async fn shutdown(&self) -> Result<(), LifecycleError> {
        info!(uptime_secs = self.start_time.elapsed().as_secs(), "shutting down daemon");

        match tokio::time::timeout(env::drain_timeout(), self.node.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "engine shutdown reported an error"),
            Err(_) => warn!("drain timed out, checkpointing anyway"),
        }

        let store = self.node.store();
        if let Err(e) = store.flush() {
            warn!(error = %e, "failed to flush WAL on shutdown");
        }
        match store.checkpoint() {
            Ok(Some(result)) => {
                info!(seq = result.seq, size_bytes = result.size_bytes, "saved final shutdown snapshot")
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to save shutdown snapshot"),
        }

        let lock_path = self.config.lock_path();
        if lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&lock_path) {
                warn!(error = %e, "failed to remove PID file");
            }
        }

        // Lock is released when self.lock_file is dropped
        info!("daemon shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod test_helpers;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
