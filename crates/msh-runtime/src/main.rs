//! # MSH Gateway
//!
//! Entry point of the gateway process.
//!
//! ## Startup
//!
//! 1. Initialize logging (`MSH_LOG`, then `RUST_LOG`, default `info`)
//! 2. Load configuration from `MSH_*` environment variables
//! 3. Start the runtime
//! 4. Run until Ctrl+C, then shut down gracefully

use anyhow::{Context, Result};
use msh_runtime::{GatewayConfig, GatewayRuntime};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn init_logging() {
    let filter = std::env::var("MSH_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = GatewayConfig::from_env().context("Failed to load configuration")?;
    let runtime = GatewayRuntime::start(config).await?;

    info!("Gateway is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    runtime.shutdown().await;
    Ok(())
}
