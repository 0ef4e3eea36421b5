use axum::{extract::State, routing::post, Json, Router};

use crate::routes::extract::AppJson;
use tracing::info;

use crate::models::{AppState, GenerateRequest, GenerateResponse};
use crate::types::AppResult;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .with_state(state)
}

async fn generate(
    State(state): State<AppState>,
    AppJson(request): AppJson<GenerateRequest>,
) -> AppResult<Json<GenerateResponse>> {
    info!(website_id = %request.website_id, keyword_id = ?request.keyword_id, "Received generate request");

    let job = state
        .control
        .generate(request.website_id, request.keyword_id, request.options)
        .await?;

    Ok(Json(GenerateResponse {
        job_id: job.id,
        keyword: job.input.keyword,
    }))
}
