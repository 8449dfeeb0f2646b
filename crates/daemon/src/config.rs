// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: `orcd.toml` plus `ORC_*` environment overrides.
//!
//! Precedence, highest first: environment, config file, built-in defaults.
//! A relative `jobs_dir` is resolved against the directory holding the config
//! file, or against the state directory when no file was given.

use std::path::{Path, PathBuf};

use orc_engine::{CoordinatorConfig, EngineConfig, ExecutorConfig, LogConfig, TrackerConfig};
use serde::Deserialize;
use thiserror::Error;

use crate::env;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to read config {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// `[chain]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChainConfig {
    pub ws_url: String,
    /// Address transactions are sent from
    pub sending_key: String,
    /// Heads kept in the in-memory chain view
    pub head_history: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8546".to_string(),
            sending_key: String::new(),
            head_history: TrackerConfig::default().head_history,
        }
    }
}

/// On-disk shape; every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    state_dir: Option<PathBuf>,
    jobs_dir: Option<PathBuf>,
    chain: ChainConfig,
    executor: ExecutorConfig,
    coordinator: CoordinatorConfig,
    logs: LogConfig,
}

/// Resolved daemon configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/orc)
    pub state_dir: PathBuf,
    /// Directory of job spec files, one TOML job per file
    pub jobs_dir: PathBuf,
    pub chain: ChainConfig,
    pub executor: ExecutorConfig,
    pub coordinator: CoordinatorConfig,
    /// `[logs]`: log trigger polling
    pub logs: LogConfig,
}

impl Config {
    /// Load from `path` (or defaults when `None`), then apply environment
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (raw, base) = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
                (raw, path.parent().map(Path::to_path_buf))
            }
            None => (String::new(), None),
        };
        let file: FileConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.map(Path::to_path_buf).unwrap_or_default(),
            source,
        })?;
        Self::resolve(file, base.as_deref())
    }

    fn resolve(file: FileConfig, base: Option<&Path>) -> Result<Self, ConfigError> {
        let state_dir = match (env::state_dir_override(), file.state_dir) {
            (Some(dir), _) => dir,
            (None, Some(dir)) => expand_home(&dir)?,
            (None, None) => env::state_dir()?,
        };

        let jobs_dir = expand_home(&file.jobs_dir.unwrap_or_else(|| PathBuf::from("jobs")))?;
        let jobs_dir = if jobs_dir.is_absolute() {
            jobs_dir
        } else {
            base.filter(|b| !b.as_os_str().is_empty()).unwrap_or(state_dir.as_path()).join(jobs_dir)
        };

        let mut config = Self {
            state_dir,
            jobs_dir,
            chain: file.chain,
            executor: file.executor,
            coordinator: file.coordinator,
            logs: file.logs,
        };

        if let Some(url) = env::chain_ws_url() {
            config.chain.ws_url = url;
        }
        if let Some(workers) = env::workers()? {
            config.executor.workers = workers;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chain.sending_key.trim().is_empty() {
            return Err(ConfigError::Missing("chain.sending_key"));
        }
        if self.chain.head_history == 0 {
            return Err(ConfigError::Invalid("chain.head_history must be at least 1".into()));
        }
        if self.executor.workers == 0 {
            return Err(ConfigError::Invalid("executor.workers must be at least 1".into()));
        }
        if self.coordinator.initial_fee > self.coordinator.max_fee {
            return Err(ConfigError::Invalid(format!(
                "coordinator.initial_fee {} exceeds max_fee {}",
                self.coordinator.initial_fee, self.coordinator.max_fee
            )));
        }
        if self.logs.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("logs.poll_interval must be non-zero".into()));
        }
        if self.logs.max_range == 0 {
            return Err(ConfigError::Invalid("logs.max_range must be at least 1".into()));
        }
        Ok(())
    }

    /// Path to lock/PID file
    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("orcd.pid")
    }

    pub fn wal_path(&self) -> PathBuf {
        self.state_dir.join("wal").join("events.wal")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join("snapshot.zst")
    }

    /// Directory for the rolling daemon log
    pub fn logs_path(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            tracker: TrackerConfig { head_history: self.chain.head_history, ..TrackerConfig::default() },
            executor: self.executor.clone(),
            coordinator: self.coordinator.clone(),
            logs: self.logs.clone(),
        }
    }
}

fn expand_home(path: &Path) -> Result<PathBuf, ConfigError> {
    match path.strip_prefix("~") {
        Ok(rest) => Ok(env::home()?.join(rest)),
        Err(_) => Ok(path.to_path_buf()),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
