use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use tracing::{error, info};

use super::{ApiError, ApiState};
use crate::database::Token;
use crate::token_registry::CreateTokenRequest;

pub fn create_token_routes() -> Router<ApiState> {
    Router::new().route("/tokens", get(list_tokens).post(create_token))
}

/// Register a token record. Every failure, including a duplicate address, is a 400.
async fn create_token(
    State(state): State<ApiState>,
    payload: Result<Json<CreateTokenRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Token>), ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let token = request
        .into_token()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    match state.token_store.create_token(&token).await {
        Ok(created) => {
            info!("Registered token {} at address: {}", created.name, created.address);
            Ok((StatusCode::CREATED, Json(created)))
        }
        Err(e) => {
            error!("Failed to create token {}: {}", token.address, e);
            Err(ApiError::BadRequest(e.to_string()))
        }
    }
}

/// Every record not explicitly hidden with `flag: false`.
async fn list_tokens(State(state): State<ApiState>) -> Result<Json<Vec<Token>>, ApiError> {
    match state.token_store.list_visible_tokens().await {
        Ok(tokens) => Ok(Json(tokens)),
        Err(e) => {
            error!("Failed to list tokens: {}", e);
            Err(ApiError::Internal(e.to_string()))
        }
    }
}
