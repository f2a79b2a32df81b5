pub mod error;
pub mod ingestion_api;
pub mod tokens;

pub use error::ApiError;
pub use ingestion_api::create_ingestion_routes;
pub use tokens::create_token_routes;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::database::TokenStore;
use crate::token_registry::IngestionScheduler;

/// Dependencies shared by every handler.
#[derive(Clone)]
pub struct ApiState {
    pub token_store: Arc<dyn TokenStore>,
    /// `None` when no ledger is configured.
    pub scheduler: Option<Arc<IngestionScheduler>>,
}

impl ApiState {
    pub fn new(token_store: Arc<dyn TokenStore>, scheduler: Option<Arc<IngestionScheduler>>) -> Self {
        Self {
            token_store,
            scheduler,
        }
    }
}

/// Full HTTP application: token routes, ingestion routes, health, CORS.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(create_token_routes())
        .merge(create_ingestion_routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    info!("Health check requested");
    "OK"
}
