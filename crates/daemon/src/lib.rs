// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! orc-daemon: configuration, logging and lifecycle for `orcd`

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod env;
pub mod lifecycle;
pub mod logging;

pub use config::{ChainConfig, Config, ConfigError};
pub use lifecycle::{load_jobs, startup, startup_with, Daemon, LifecycleError};
