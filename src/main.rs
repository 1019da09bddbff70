//! paddock - F1 telemetry relay service
//!
//! Receives F1 UDP telemetry and serves decoded player car telemetry to
//! WebSocket clients on `/telemetry`, with a liveness probe on `/healthz`.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paddock::{Relay, RelayConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = RelayConfig::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_directive().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let relay = Relay::bind(config)
        .await
        .context("Failed to start telemetry ingestion")?
        .start()
        .await
        .context("Failed to start subscription server")?;

    tokio::signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    let stats = relay.shutdown().await;
    info!(
        received = stats.received,
        broadcast = stats.broadcast,
        read_errors = stats.read_errors,
        "Goodbye"
    );
    Ok(())
}
