use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use super::{ApiError, ApiState};
use crate::database::FailedPair;
use crate::token_registry::{IngestionError, IngestionScheduler, IngestionStatus};

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestionStatusResponse {
    pub factory_address: String,
    /// Next pair index the routine will process.
    pub cursor: u64,
    /// Pairs skipped by earlier runs and queued for retry.
    pub failed_pairs: Vec<FailedPair>,
    pub scheduler_running: bool,
    #[serde(flatten)]
    pub status: IngestionStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestionTriggerResponse {
    pub message: String,
}

pub fn create_ingestion_routes() -> Router<ApiState> {
    Router::new()
        .route("/ingestion/status", get(get_ingestion_status))
        .route("/ingestion/run", post(trigger_ingestion))
}

fn scheduler(state: &ApiState) -> Result<&Arc<IngestionScheduler>, ApiError> {
    state
        .scheduler
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("ingestion is not configured".to_string()))
}

async fn get_ingestion_status(
    State(state): State<ApiState>,
) -> Result<Json<IngestionStatusResponse>, ApiError> {
    let scheduler = scheduler(&state)?;
    let service = scheduler.service();

    let cursor = service.current_cursor().await.map_err(|e| {
        error!("Failed to load ingestion cursor: {}", e);
        ApiError::Internal(e.to_string())
    })?;
    let failed_pairs = service.failed_pairs().await.map_err(|e| {
        error!("Failed to load failed pairs: {}", e);
        ApiError::Internal(e.to_string())
    })?;

    Ok(Json(IngestionStatusResponse {
        factory_address: service.cursor_key(),
        cursor,
        failed_pairs,
        scheduler_running: scheduler.is_running().await,
        status: scheduler.status().await,
    }))
}

/// Start a run in the background; progress is visible on `/ingestion/status`.
async fn trigger_ingestion(
    State(state): State<ApiState>,
) -> Result<(StatusCode, Json<IngestionTriggerResponse>), ApiError> {
    let scheduler = scheduler(&state)?;

    match scheduler.spawn_run() {
        Ok(_handle) => {
            info!("Manual ingestion run triggered");
            Ok((
                StatusCode::ACCEPTED,
                Json(IngestionTriggerResponse {
                    message: "ingestion run started".to_string(),
                }),
            ))
        }
        Err(IngestionError::AlreadyRunning) => Err(ApiError::Conflict(
            "an ingestion run is already in progress".to_string(),
        )),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}
