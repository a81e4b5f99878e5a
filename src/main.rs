use anyhow::Context;
use confluence::application::engine::SignalEngine;
use confluence::config::SignalConfig;
use confluence::infrastructure::MockMarketDataProvider;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = SignalConfig::from_env().context("Failed to load configuration")?;
    info!(
        "Starting signal engine for {} (trading timeframe {}, every {:?})",
        config.symbol, config.trading_timeframe, config.aggregation_interval
    );

    let base_price: f64 = confluence::config::env_parse("MOCK_BASE_PRICE", 96_000.0)?;
    let provider = Arc::new(MockMarketDataProvider::new(base_price));
    let (engine, mut outputs) =
        SignalEngine::new(config, provider).context("Failed to build signal engine")?;

    engine.start().await.context("Failed to start signal engine")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            Some(signal) = outputs.signals.recv() => {
                match (signal.is_actionable(), signal.target_price, signal.stop_price) {
                    (true, Some(target), Some(stop)) => {
                        info!("{} target={} stop={}", signal, target, stop)
                    }
                    _ => info!("{}", signal),
                }
            }
            Some(diagnostic) = outputs.diagnostics.recv() => {
                warn!("Diagnostic: {}", diagnostic);
            }
        }
    }

    engine.stop().await;
    match serde_json::to_string_pretty(&engine.status().await) {
        Ok(status) => info!("Final status:\n{}", status),
        Err(e) => error!("Failed to serialize status: {}", e),
    }
    Ok(())
}
