//! Job store wrappers for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CancelOutcome, GenerationJob, InMemoryJobStore, JobStore, NewJob, Stage};
use crate::types::{AppError, AppResult};

/// In-memory store that records every progress write and can be told to
/// fail its next few claims or progress writes as if the database were
/// unreachable.
#[derive(Default)]
pub(crate) struct RecordingJobStore {
    inner: InMemoryJobStore,
    progress: Mutex<Vec<(Stage, u8)>>,
    failing_claims: AtomicUsize,
    failing_progress: AtomicUsize,
    pub(crate) claims: AtomicUsize,
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl RecordingJobStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_next_claims(&self, count: usize) {
        self.failing_claims.store(count, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_progress(&self, count: usize) {
        self.failing_progress.store(count, Ordering::SeqCst);
    }

    pub(crate) async fn progress(&self) -> Vec<(Stage, u8)> {
        self.progress.lock().await.clone()
    }
}

#[async_trait]
impl JobStore for RecordingJobStore {
    async fn enqueue(&self, job: NewJob) -> AppResult<GenerationJob> {
        self.inner.enqueue(job).await
    }

    async fn claim_next(&self) -> AppResult<Option<GenerationJob>> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.failing_claims) {
            return Err(AppError::Unavailable("job store unreachable".to_string()));
        }
        self.inner.claim_next().await
    }

    async fn record_progress(&self, job_id: Uuid, stage: Stage, percent: u8) -> AppResult<()> {
        if take_one(&self.failing_progress) {
            return Err(AppError::Unavailable("job store unreachable".to_string()));
        }
        self.inner.record_progress(job_id, stage, percent).await?;
        self.progress.lock().await.push((stage, percent));
        Ok(())
    }

    async fn complete(&self, job_id: Uuid, article_id: Uuid) -> AppResult<GenerationJob> {
        self.inner.complete(job_id, article_id).await
    }

    async fn fail(&self, job_id: Uuid, stage: Stage, error: &str) -> AppResult<GenerationJob> {
        self.inner.fail(job_id, stage, error).await
    }

    async fn cancel(&self, job_id: Uuid) -> AppResult<(CancelOutcome, GenerationJob)> {
        self.inner.cancel(job_id).await
    }

    async fn finish_cancel(&self, job_id: Uuid) -> AppResult<GenerationJob> {
        self.inner.finish_cancel(job_id).await
    }

    async fn is_cancel_requested(&self, job_id: Uuid) -> AppResult<bool> {
        self.inner.is_cancel_requested(job_id).await
    }

    async fn retry(&self, job_id: Uuid) -> AppResult<GenerationJob> {
        self.inner.retry(job_id).await
    }

    async fn recover_interrupted(&self) -> AppResult<Vec<GenerationJob>> {
        self.inner.recover_interrupted().await
    }

    async fn requeue_interrupted(&self, job_id: Uuid) -> AppResult<GenerationJob> {
        self.inner.requeue_interrupted(job_id).await
    }

    async fn list_by_website(&self, website_id: Uuid) -> AppResult<Vec<GenerationJob>> {
        self.inner.list_by_website(website_id).await
    }

    async fn get(&self, job_id: Uuid) -> AppResult<Option<GenerationJob>> {
        self.inner.get(job_id).await
    }

    async fn ping(&self) -> AppResult<()> {
        self.inner.ping().await
    }
}
