//! minerwatch server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - MINERWATCH_HOST: Control API bind address (default: 127.0.0.1)
//! - MINERWATCH_PORT: Control API port (default: 8080)
//! - MINERWATCH_DATA_DIR: Directory for miners.json, miner_status.json,
//!   sent_alerts.json, stats.json and bot_stats.json (default: .)
//! - MINERWATCH_CONFIG: Hot-reloaded settings file (default: <data dir>/config.json)
//! - MINERWATCH_POLL_SECS: Seconds between poll cycles (default: 60)
//! - MINERWATCH_LEADERBOARD_URL: Leaderboard endpoint
//! - MINERWATCH_RPC_URL: JSON-RPC endpoint for balances
//! - MINERWATCH_MAX_CONCURRENCY: Concurrent balance queries (default: 16)
//! - RUST_LOG: Log level (default: info)

use minerwatch::api::run_server;
use minerwatch::config::{ConfigFile, WatchConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minerwatch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WatchConfig::from_env();
    let settings = ConfigFile::new(&config.config_path).load();

    tracing::info!("minerwatch configuration:");
    tracing::info!("  Control API: {}:{}", config.host, config.port);
    tracing::info!("  Data dir: {}", config.data_dir.display());
    tracing::info!("  Settings file: {}", config.config_path.display());
    tracing::info!("  Poll interval: {:?}", config.poll_interval);
    tracing::info!("  Leaderboard: {}", config.leaderboard_url);
    tracing::info!("  RPC: {}", config.rpc_url);
    tracing::info!("  Max concurrent balance queries: {}", config.max_concurrency);
    tracing::info!(
        "  Telegram channel: {:?}",
        settings.alert_settings.channel_status()
    );

    run_server(config).await
}
