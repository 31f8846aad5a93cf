//! Discovery service entry point.

use anyhow::{Context, Result};
use clap::Parser;
use ephemeral_core::DiscoveryConfig;
use ephemeral_discovery::DiscoveryService;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "ephemeral-discovery")]
#[command(about = "Per-game player registration and startup coordination", long_about = None)]
struct Cli {
    /// Path to the Discovery configuration file, in JSON.
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let raw = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("reading config file {}", cli.config.display()))?;
    let config: DiscoveryConfig =
        serde_json::from_str(&raw).with_context(|| "parsing discovery config")?;

    let service = DiscoveryService::new(config)
        .map_err(|err| anyhow::anyhow!("invalid discovery config: {err}"))?;

    let shutdown = CancellationToken::new();
    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        ctrl_c_shutdown.cancel();
    });

    service
        .run(shutdown)
        .await
        .map_err(|err| anyhow::anyhow!("discovery service exited: {err}"))
}
