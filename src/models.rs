use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::content::{Article, ArticleStore};
use crate::control::{ControlSurface, GenerateOptions};
use crate::queue::{GenerationJob, JobInput, JobStatus, JobStore, Stage};

#[derive(Clone)]
pub struct AppState {
    pub control: Arc<ControlSurface>,
    pub jobs: Arc<dyn JobStore>,
    pub articles: Arc<dyn ArticleStore>,
    pub config: Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub website_id: Uuid,
    #[serde(default)]
    pub keyword_id: Option<Uuid>,
    #[serde(flatten)]
    pub options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub job_id: Uuid,
    pub keyword: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobAction {
    Retry,
    Cancel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobActionRequest {
    pub action: JobAction,
    pub job_id: Uuid,
}

/// `job_id` is the replacement job for a retry, absent for a cancel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobActionResponse {
    pub keyword: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsQuery {
    pub website_id: Uuid,
}

/// Job as shown to polling clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: Uuid,
    pub status: JobStatus,
    pub current_step: Option<Stage>,
    pub progress: u8,
    pub error: Option<String>,
    #[serde(default)]
    pub failed_stage: Option<Stage>,
    #[serde(default)]
    pub cancel_requested: bool,
    pub input: JobInput,
    #[serde(default)]
    pub retry_of: Option<Uuid>,
    #[serde(default)]
    pub retried_as: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blog_post: Option<Article>,
}

impl JobView {
    pub fn new(job: GenerationJob, blog_post: Option<Article>) -> Self {
        Self {
            id: job.id,
            status: job.status,
            current_step: job.current_stage,
            progress: job.progress,
            error: job.error,
            failed_stage: job.failed_stage,
            cancel_requested: job.cancel_requested,
            input: job.input,
            retry_of: job.retry_of,
            retried_as: job.retried_as,
            created_at: job.created_at,
            finished_at: job.finished_at,
            blog_post,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub store: String,
}
