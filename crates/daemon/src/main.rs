// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! gkd: the gamekeeper host controller daemon.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use gk_daemon::{startup, Config};

#[derive(Parser, Debug)]
#[command(name = "gkd", about = "gamekeeper host controller daemon")]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "/etc/gamekeeper/config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = if args.config.exists() {
        Config::load(&args.config)
            .with_context(|| format!("loading {}", args.config.display()))?
    } else {
        Config::default()
    };

    let _log_guard = init_tracing(&config)?;
    info!(config = %args.config.display(), "gkd starting");

    let daemon = startup(config).await.context("daemon startup")?;

    tokio::signal::ctrl_c().await.context("signal handler")?;
    info!("interrupt received; shutting down");
    daemon.shutdown().await;
    Ok(())
}

fn init_tracing(config: &Config) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.file_logging.level.clone()));

    if config.file_logging.enabled {
        let log_dir = config.log_dir();
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("creating {}", log_dir.display()))?;
        let appender = tracing_appender::rolling::daily(&log_dir, "gkd.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
        Ok(None)
    }
}
