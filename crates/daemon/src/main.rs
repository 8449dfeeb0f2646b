// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! orcd: the run execution daemon

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use orc_daemon::{logging, startup, Config, LifecycleError};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "orcd", version, about = "Oracle run execution daemon")]
struct Args {
    /// Path to orcd.toml
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("orcd: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _guard = match logging::init(&config.logs_path()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("orcd: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "daemon failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), LifecycleError> {
    let daemon = startup(&config).await?;
    info!(
        ws_url = %config.chain.ws_url,
        jobs = daemon.node.jobs().len(),
        "READY"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c, stopping");
    }
    info!("received shutdown signal");
    daemon.shutdown().await
}
