use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::alerts::{AlertEngine, ChannelStatus};
use crate::config::ConfigFile;
use crate::digest::{DigestError, StatsDigest};
use crate::driver::{CycleReport, DriverError, PollingDriver};
use crate::miners::{MinerRegistry, RegistryError};

/// Application state shared across handlers
pub struct AppState {
    pub driver: Arc<PollingDriver>,
    pub engine: Arc<AlertEngine>,
    pub registry: Arc<MinerRegistry>,
    pub digest: Arc<StatsDigest>,
    pub config: ConfigFile,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Status
// ============================================================================

#[derive(Serialize)]
pub struct StatusResponse {
    /// Whether alerts can currently be delivered, from the on-disk settings
    pub channel: ChannelStatus,
    pub cycle_running: bool,
    pub last_cycle_at: Option<i64>,
    pub miners: usize,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        channel: state.config.load().alert_settings.channel_status(),
        cycle_running: state.driver.is_busy(),
        last_cycle_at: state.driver.last_report().map(|r| r.generated_at),
        miners: state.registry.load().len(),
    })
}

// ============================================================================
// Miner Registry
// ============================================================================

#[derive(Serialize)]
pub struct MinersResponse {
    pub miners: Vec<String>,
}

pub async fn list_miners(State(state): State<Arc<AppState>>) -> Json<MinersResponse> {
    Json(MinersResponse {
        miners: state.registry.load(),
    })
}

#[derive(Deserialize)]
pub struct AddMinerRequest {
    pub miner_id: String,
}

pub async fn add_miner(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddMinerRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.registry.add(&request.miner_id)?;
    Ok(Json(serde_json::json!({ "added": request.miner_id.trim() })))
}

pub async fn remove_miner(
    State(state): State<Arc<AppState>>,
    Path(miner_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.registry.remove(&miner_id)?;
    Ok(Json(serde_json::json!({ "removed": miner_id })))
}

// ============================================================================
// Poll Cycles
// ============================================================================

pub async fn run_cycle(State(state): State<Arc<AppState>>) -> Result<Json<CycleReport>, ApiError> {
    let now = chrono::Utc::now().timestamp();
    let report = state.driver.run_cycle(now).await?;
    Ok(Json(report))
}

pub async fn last_report(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CycleReport>, ApiError> {
    state
        .driver
        .last_report()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No cycle has completed yet".to_string()))
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Serialize)]
pub struct SendResponse {
    pub sent: bool,
}

pub async fn test_alert(State(state): State<Arc<AppState>>) -> Json<SendResponse> {
    let settings = state.config.load().alert_settings;
    Json(SendResponse {
        sent: state.engine.send_test(&settings).await,
    })
}

pub async fn clear_alerts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .engine
        .clear_history()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(serde_json::json!({ "cleared": true })))
}

pub async fn send_digest(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SendResponse>, ApiError> {
    let settings = state.config.load();

    let snapshot = state.driver.last_snapshot().ok_or(DigestError::NoData)?;
    let sent = state
        .digest
        .send_now(&snapshot, &settings.stats_bot, &settings.alert_settings)
        .await?;
    Ok(Json(SendResponse { sent }))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::EmptyId => ApiError::BadRequest(e.to_string()),
            RegistryError::AlreadyExists(_) => ApiError::Conflict(e.to_string()),
            RegistryError::NotFound(_) => ApiError::NotFound(e.to_string()),
            RegistryError::Persistence(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<DriverError> for ApiError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::Busy => ApiError::Conflict(e.to_string()),
        }
    }
}

impl From<DigestError> for ApiError {
    fn from(e: DigestError) -> Self {
        match e {
            DigestError::NoMetrics => ApiError::BadRequest(e.to_string()),
            DigestError::NoData => ApiError::Conflict(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
