use axum::{
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    add_miner, clear_alerts, health_check, last_report, list_miners, remove_miner, run_cycle,
    send_digest, status, test_alert, AppState,
};
use crate::alerts::{AlertEngine, TelegramNotifier};
use crate::config::{ConfigFile, WatchConfig};
use crate::digest::StatsDigest;
use crate::driver::PollingDriver;
use crate::fetch::{BalanceClient, HttpStatsSource, LeaderboardClient, STATS_FILE};
use crate::miners::MinerRegistry;
use crate::store::StateStore;

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        .route("/status", get(status))
        // Miner registry
        .route("/miners", get(list_miners).post(add_miner))
        .route("/miners/:id", delete(remove_miner))
        // Poll cycles
        .route("/cycle", post(run_cycle))
        .route("/report", get(last_report))
        // Alerts
        .route("/alerts/test", post(test_alert))
        .route("/alerts/clear", post(clear_alerts))
        .route("/digest", post(send_digest))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Wire every component from `config`
pub fn build_state(config: &WatchConfig) -> Arc<AppState> {
    let config_file = ConfigFile::new(&config.config_path);
    let settings = config_file.load();

    let engine = Arc::new(AlertEngine::new(
        StateStore::open(&config.data_dir),
        Arc::new(TelegramNotifier::new()),
        settings.alert_settings,
    ));

    let source = HttpStatsSource::new(
        LeaderboardClient::new(&config.leaderboard_url, config.fetch_timeout),
        BalanceClient::new(&config.rpc_url, config.fetch_timeout),
    )
    .with_max_concurrency(config.max_concurrency)
    .with_blob_path(config.data_dir.join(STATS_FILE));

    let registry = Arc::new(MinerRegistry::open(&config.data_dir));
    let driver = Arc::new(PollingDriver::new(
        Arc::clone(&registry),
        Arc::new(source),
        Arc::clone(&engine),
        config_file.clone(),
        config.poll_interval,
    ));
    let digest = Arc::new(StatsDigest::open(Arc::clone(&engine), &config.data_dir));

    Arc::new(AppState {
        driver,
        engine,
        registry,
        digest,
        config: config_file,
    })
}

/// Run the poller, digest timer and HTTP server until Ctrl+C
pub async fn run_server(config: WatchConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(&config);

    // Start background workers
    let driver_handle = Arc::clone(&state.driver).start();
    let (digest_shutdown, digest_handle) =
        Arc::clone(&state.digest).start(Arc::clone(&state.driver), state.config.clone());

    let driver = Arc::clone(&state.driver);
    let app = build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting minerwatch control API on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&driver)))
        .await?;

    // Let an in-flight cycle finish before exiting.
    let _ = digest_shutdown.send(()).await;
    if let Err(e) = driver_handle.await {
        tracing::error!(error = %e, "Polling driver task failed");
    }
    let _ = digest_handle.await;

    tracing::info!("minerwatch stopped");
    Ok(())
}

async fn shutdown_signal(driver: Arc<PollingDriver>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutdown signal received, stopping workers...");
    driver.stop();
}
