//! stolon-haproxy entrypoint
//!
//! Keeps the HAProxy read-only backend list in sync with the healthy standbys
//! of a stolon PostgreSQL cluster.

use anyhow::{Context, Result};
use clap::Parser;
use common::{init_logging, SystemShell};
use std::path::PathBuf;
use stolon_haproxy::{PollLoop, Settings, StolonEnv};
use tracing::info;

#[derive(Parser)]
#[command(version, about = "Sync HAProxy backends with stolon cluster data")]
struct Args {
    /// Path to the YAML config file
    config: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = init_logging("stolon-haproxy");

    let settings = Settings::load(&args.config)?;
    let env = StolonEnv::from_env()?;

    info!(
        cluster = %env.cluster_name,
        store = %env.store_backend,
        endpoints = %env.store_endpoints,
        config = %settings.postgres_haproxy_config.display(),
        "=== stolon-haproxy ==="
    );

    let poll = PollLoop::new(&settings, SystemShell)?;
    poll.run().await.context("Failed to install signal handlers")?;

    info!("Exiting");
    Ok(())
}
