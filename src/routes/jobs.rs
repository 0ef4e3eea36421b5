use axum::{extract::State, routing::get, Json, Router};
use futures::future::try_join_all;
use tracing::info;
use uuid::Uuid;

use crate::models::{
    AppState, JobAction, JobActionRequest, JobActionResponse, JobView, JobsQuery,
};
use crate::queue::GenerationJob;
use crate::routes::extract::{AppJson, AppPath, AppQuery};
use crate::types::AppResult;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/jobs", get(list_jobs).post(job_action))
        .route("/api/jobs/{id}", get(get_job))
        .with_state(state)
}

/// Attach the article of a completed job.
async fn view(state: &AppState, job: GenerationJob) -> AppResult<JobView> {
    let blog_post = match job.article_id {
        Some(article_id) => state.articles.get(article_id).await?,
        None => None,
    };
    Ok(JobView::new(job, blog_post))
}

async fn list_jobs(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<JobsQuery>,
) -> AppResult<Json<Vec<JobView>>> {
    let jobs = state.control.list(query.website_id).await?;
    let views = try_join_all(jobs.into_iter().map(|job| view(&state, job))).await?;
    Ok(Json(views))
}

async fn get_job(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<JobView>> {
    let job = state.control.get(id).await?;
    Ok(Json(view(&state, job).await?))
}

async fn job_action(
    State(state): State<AppState>,
    AppJson(request): AppJson<JobActionRequest>,
) -> AppResult<Json<JobActionResponse>> {
    info!(job_id = %request.job_id, action = ?request.action, "Received job action");

    let response = match request.action {
        JobAction::Retry => {
            let replacement = state.control.retry(request.job_id).await?;
            JobActionResponse {
                keyword: replacement.input.keyword,
                job_id: Some(replacement.id),
                status: replacement.status,
            }
        }
        JobAction::Cancel => {
            let (_, job) = state.control.cancel(request.job_id).await?;
            JobActionResponse {
                keyword: job.input.keyword,
                job_id: None,
                status: job.status,
            }
        }
    };
    Ok(Json(response))
}
