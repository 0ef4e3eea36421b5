//! In-process job store.
//!
//! Jobs live in insertion order behind one async mutex, so each operation is
//! a single critical section and claim order is enqueue order.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::jobs::{CancelOutcome, GenerationJob, JobStatus, NewJob, Stage};
use super::store::JobStore;
use crate::types::{AppError, AppResult};

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<Vec<GenerationJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_mut(jobs: &mut [GenerationJob], job_id: Uuid) -> AppResult<&mut GenerationJob> {
        jobs.iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))
    }

    fn ensure_no_active(jobs: &[GenerationJob], candidate: &GenerationJob) -> AppResult<()> {
        let busy = jobs.iter().any(|j| {
            j.status.is_active() && j.same_keyword(candidate.website_id, &candidate.input)
        });
        if busy {
            return Err(AppError::Conflict(format!(
                "keyword '{}' already has a job in flight",
                candidate.input.keyword
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: NewJob) -> AppResult<GenerationJob> {
        let job = GenerationJob::new(job);
        let mut jobs = self.jobs.lock().await;
        Self::ensure_no_active(&jobs, &job)?;
        jobs.push(job.clone());
        info!(job_id = %job.id, keyword = %job.input.keyword, "Job enqueued");
        Ok(job)
    }

    async fn claim_next(&self) -> AppResult<Option<GenerationJob>> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.iter_mut().find(|j| j.status == JobStatus::Queued) else {
            return Ok(None);
        };
        job.claim(Utc::now())?;
        Ok(Some(job.clone()))
    }

    async fn record_progress(&self, job_id: Uuid, stage: Stage, percent: u8) -> AppResult<()> {
        let mut jobs = self.jobs.lock().await;
        Self::find_mut(&mut jobs, job_id)?.advance(stage, percent, Utc::now())
    }

    async fn complete(&self, job_id: Uuid, article_id: Uuid) -> AppResult<GenerationJob> {
        let mut jobs = self.jobs.lock().await;
        let job = Self::find_mut(&mut jobs, job_id)?;
        job.complete(article_id, Utc::now())?;
        Ok(job.clone())
    }

    async fn fail(&self, job_id: Uuid, stage: Stage, error: &str) -> AppResult<GenerationJob> {
        let mut jobs = self.jobs.lock().await;
        let job = Self::find_mut(&mut jobs, job_id)?;
        job.fail(stage, error, Utc::now())?;
        Ok(job.clone())
    }

    async fn cancel(&self, job_id: Uuid) -> AppResult<(CancelOutcome, GenerationJob)> {
        let mut jobs = self.jobs.lock().await;
        let job = Self::find_mut(&mut jobs, job_id)?;
        let outcome = job.request_cancel(Utc::now())?;
        Ok((outcome, job.clone()))
    }

    async fn finish_cancel(&self, job_id: Uuid) -> AppResult<GenerationJob> {
        let mut jobs = self.jobs.lock().await;
        let job = Self::find_mut(&mut jobs, job_id)?;
        job.finish_cancel(Utc::now())?;
        Ok(job.clone())
    }

    async fn is_cancel_requested(&self, job_id: Uuid) -> AppResult<bool> {
        let mut jobs = self.jobs.lock().await;
        Ok(Self::find_mut(&mut jobs, job_id)?.cancel_requested)
    }

    async fn retry(&self, job_id: Uuid) -> AppResult<GenerationJob> {
        let mut jobs = self.jobs.lock().await;
        // Work on a copy so a conflict leaves the original untouched
        let mut original = Self::find_mut(&mut jobs, job_id)?.clone();
        let replacement = original.spawn_retry(Utc::now())?;
        Self::ensure_no_active(&jobs, &replacement)?;

        *Self::find_mut(&mut jobs, job_id)? = original;
        jobs.push(replacement.clone());
        Ok(replacement)
    }

    async fn recover_interrupted(&self) -> AppResult<Vec<GenerationJob>> {
        let mut jobs = self.jobs.lock().await;
        let now = Utc::now();
        let mut recovered = Vec::new();
        for job in jobs.iter_mut().filter(|j| j.status == JobStatus::Processing) {
            job.recover(now)?;
            recovered.push(job.clone());
        }
        Ok(recovered)
    }

    async fn requeue_interrupted(&self, job_id: Uuid) -> AppResult<GenerationJob> {
        let mut jobs = self.jobs.lock().await;
        let job = Self::find_mut(&mut jobs, job_id)?;
        job.recover(Utc::now())?;
        Ok(job.clone())
    }

    async fn list_by_website(&self, website_id: Uuid) -> AppResult<Vec<GenerationJob>> {
        let jobs = self.jobs.lock().await;
        Ok(jobs
            .iter()
            .rev()
            .filter(|j| j.website_id == website_id)
            .cloned()
            .collect())
    }

    async fn get(&self, job_id: Uuid) -> AppResult<Option<GenerationJob>> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
