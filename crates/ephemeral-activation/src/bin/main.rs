//! Activation service entry point.

use anyhow::{Context, Result};
use clap::Parser;
use ephemeral_activation::{build_router, AppState};
use ephemeral_core::ActivationConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ephemeral-activation")]
#[command(about = "Per-player MPC activation endpoint", long_about = None)]
struct Cli {
    /// Path to the Activation configuration file, in JSON.
    #[arg(short, long)]
    config: PathBuf,

    /// This site's externally-reachable address, advertised to peers during
    /// registration.
    #[arg(long)]
    site_ip: String,

    /// The compute pod hosting this player, if any.
    #[arg(long)]
    pod: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let raw = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("reading config file {}", cli.config.display()))?;
    let config: ActivationConfig =
        serde_json::from_str(&raw).with_context(|| "parsing activation config")?;
    config
        .validate()
        .map_err(|err| anyhow::anyhow!("invalid activation config: {err}"))?;

    let addr = config
        .http_address
        .parse()
        .with_context(|| format!("invalid http_address {}", config.http_address))?;
    let state = AppState::new(config, cli.pod.map(Into::into), cli.site_ip);
    let router = build_router(state);

    tracing::info!(%addr, "activation endpoint listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
