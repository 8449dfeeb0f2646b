// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log setup: stderr plus a non-blocking daily file under `state_dir/logs`.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::env;
use crate::lifecycle::LifecycleError;

pub const LOG_FILE_PREFIX: &str = "orcd.log";

/// Install the global subscriber. Keep the returned guard alive for the life
/// of the process; dropping it flushes and stops the file writer.
pub fn init(logs_dir: &Path) -> Result<WorkerGuard, LifecycleError> {
    std::fs::create_dir_all(logs_dir)?;
    let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_new(env::log_filter())
        .map_err(|e| LifecycleError::Logging(format!("bad ORC_LOG directive: {e}")))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .map_err(|e| LifecycleError::Logging(e.to_string()))?;

    Ok(guard)
}
