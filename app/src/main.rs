//! Timed demo - drives the demo endpoints and logs their execution time
//!
//! Usage: `timed-demo [config.json]`. Set `RUST_LOG=info` to see the
//! timing records.

mod controller;
mod orders;

use anyhow::{Context, Result};
use controller::{FooController, FooService};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn load_config() -> Result<timed::TimingConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(timed::TimingConfig::default());
    };

    let text = std::fs::read_to_string(&path).with_context(|| format!("failed to read config {}", path))?;
    let config = timed::TimingConfig::from_json(&text).with_context(|| format!("invalid config {}", path))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = load_config()?;
    timed::install(&config);
    tracing::info!(enabled = config.enabled, level = ?config.level, "Starting timed demo");

    let controller = FooController::new(FooService);

    tracing::info!("{}", controller.not_timed().await);
    tracing::info!("{}", controller.regular());
    tracing::info!("{}", controller.suspending().await);
    tracing::info!("{}", controller.internal_function_call().await);
    tracing::info!("{}", controller.external_function_call().await);

    let registry = orders::registry(timed::global_sink(), config)?;

    let order = registry
        .dispatch_async(orders::LOOKUP, vec![json!(42)])
        .await?
        .map_err(anyhow::Error::msg)?;
    tracing::info!(%order, "order lookup");

    let count = registry
        .dispatch_async(orders::COUNT, vec![])
        .await?
        .map_err(anyhow::Error::msg)?;
    tracing::info!(%count, "order count");

    Ok(())
}
