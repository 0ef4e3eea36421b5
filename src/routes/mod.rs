//! API Routes
//!
//! - `/api/generate` - Enqueue a generation job
//! - `/api/jobs` - Job listing, detail, retry and cancel
//! - `/api/health` - Health checks

pub mod extract;
pub mod generate;
pub mod health;
pub mod jobs;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::cors_layer;
use crate::models::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let cors = cors_layer(&state.config.server.cors_allowed_origins);

    Router::new()
        .merge(generate::router(state.clone()))
        .merge(jobs::router(state.clone()))
        .merge(health::router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
