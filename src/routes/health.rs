use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::warn;

use crate::models::{AppState, HealthResponse};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status, store) = match state.jobs.ping().await {
        Ok(()) => (StatusCode::OK, "ok", "connected".to_string()),
        Err(e) => {
            warn!(error = %e, "Job store unreachable");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", e.to_string())
        }
    };

    let response = HealthResponse {
        status: status.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        store,
    };

    (code, Json(response))
}
