// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::ConfigError;

/// Resolve state directory: ORC_STATE_DIR > XDG_STATE_HOME/orc > ~/.local/state/orc
pub fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = state_dir_override() {
        return Ok(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("orc"));
    }
    Ok(home()?.join(".local/state/orc"))
}

/// Explicit `ORC_STATE_DIR`, which beats the config file
pub fn state_dir_override() -> Option<PathBuf> {
    std::env::var("ORC_STATE_DIR").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

pub fn home() -> Result<PathBuf, ConfigError> {
    std::env::var("HOME").map(PathBuf::from).map_err(|_| ConfigError::NoStateDir)
}

/// Websocket endpoint override
pub fn chain_ws_url() -> Option<String> {
    std::env::var("ORC_CHAIN_WS_URL").ok().filter(|s| !s.is_empty())
}

/// Executor pool size override. Present but unparseable is an error.
pub fn workers() -> Result<Option<usize>, ConfigError> {
    match std::env::var("ORC_WORKERS") {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .map(Some)
            .ok_or(ConfigError::Env { var: "ORC_WORKERS", value: raw }),
        Err(_) => Ok(None),
    }
}

/// Log filter directives (default `info`)
pub fn log_filter() -> String {
    std::env::var("ORC_LOG").ok().filter(|s| !s.is_empty()).unwrap_or_else(|| "info".to_string())
}

/// Shutdown drain timeout (default 5s, configurable via `ORC_DRAIN_TIMEOUT_MS`).
pub fn drain_timeout() -> Duration {
    std::env::var("ORC_DRAIN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
