use async_trait::async_trait;
use uuid::Uuid;

use super::jobs::{CancelOutcome, GenerationJob, NewJob, Stage};
use crate::types::AppResult;

/// Durable record of generation jobs.
///
/// Every mutation is a conditional transition keyed on the job's current
/// state, so two callers racing on the same job cannot both win. Illegal
/// transitions come back as `AppError::InvalidTransition`, unknown ids as
/// `AppError::NotFound`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a `QUEUED` job. Fails with `Conflict` if the keyword already
    /// has a queued or processing job on the same website.
    async fn enqueue(&self, job: NewJob) -> AppResult<GenerationJob>;

    /// Take the oldest `QUEUED` job and move it to `PROCESSING` at the first
    /// stage. Never hands the same job to two callers.
    async fn claim_next(&self) -> AppResult<Option<GenerationJob>>;

    async fn record_progress(&self, job_id: Uuid, stage: Stage, percent: u8) -> AppResult<()>;

    async fn complete(&self, job_id: Uuid, article_id: Uuid) -> AppResult<GenerationJob>;

    async fn fail(&self, job_id: Uuid, stage: Stage, error: &str) -> AppResult<GenerationJob>;

    /// Legal while `QUEUED` (cancels outright) or `PROCESSING` (raises the
    /// cooperative flag). Returns the job as stored after the request.
    async fn cancel(&self, job_id: Uuid) -> AppResult<(CancelOutcome, GenerationJob)>;

    /// Settle a processing job whose cancellation flag was observed.
    async fn finish_cancel(&self, job_id: Uuid) -> AppResult<GenerationJob>;

    async fn is_cancel_requested(&self, job_id: Uuid) -> AppResult<bool>;

    /// Create a fresh `QUEUED` job from a `FAILED` one and link the two.
    async fn retry(&self, job_id: Uuid) -> AppResult<GenerationJob>;

    /// Reset jobs left `PROCESSING` by a previous process. Returns the
    /// affected jobs in their new state.
    async fn recover_interrupted(&self) -> AppResult<Vec<GenerationJob>>;

    /// Same reset as `recover_interrupted`, for one `PROCESSING` job whose
    /// run was abandoned by this process.
    async fn requeue_interrupted(&self, job_id: Uuid) -> AppResult<GenerationJob>;

    /// Newest first.
    async fn list_by_website(&self, website_id: Uuid) -> AppResult<Vec<GenerationJob>>;

    async fn get(&self, job_id: Uuid) -> AppResult<Option<GenerationJob>>;

    /// Reachability check for the health route.
    async fn ping(&self) -> AppResult<()>;
}
