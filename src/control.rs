//! Control Surface
//!
//! The synchronous entry points behind the HTTP API: generate, retry,
//! cancel and the read-only listing. Each request is validated against the
//! job store's state machine and flips keyword status to match.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::content::{KeywordStatus, KeywordStore, WebsiteStore};
use crate::queue::{CancelOutcome, ContentLength, GenerationJob, JobInput, JobStore, NewJob};
use crate::types::{AppError, AppResult};

/// Per-request generation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOptions {
    #[serde(default)]
    pub content_length: ContentLength,
    #[serde(default = "default_true")]
    pub include_images: bool,
    #[serde(default = "default_true", alias = "includeFAQ")]
    pub include_faq: bool,
    #[serde(default)]
    pub auto_publish: bool,
}

fn default_true() -> bool {
    true
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            content_length: ContentLength::default(),
            include_images: true,
            include_faq: true,
            auto_publish: false,
        }
    }
}

pub struct ControlSurface {
    jobs: Arc<dyn JobStore>,
    keywords: Arc<dyn KeywordStore>,
    websites: Arc<dyn WebsiteStore>,
}

impl ControlSurface {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        keywords: Arc<dyn KeywordStore>,
        websites: Arc<dyn WebsiteStore>,
    ) -> Self {
        Self {
            jobs,
            keywords,
            websites,
        }
    }

    /// Enqueue a job for `keyword_id`, or for the website's highest-priority
    /// pending keyword when none is given.
    pub async fn generate(
        &self,
        website_id: Uuid,
        keyword_id: Option<Uuid>,
        options: GenerateOptions,
    ) -> AppResult<GenerationJob> {
        if self.websites.get(website_id).await?.is_none() {
            return Err(AppError::NotFound(format!("website {}", website_id)));
        }

        let keyword = match keyword_id {
            Some(id) => {
                let keyword = self
                    .keywords
                    .get(id)
                    .await?
                    .filter(|k| k.website_id == website_id)
                    .ok_or_else(|| AppError::NotFound(format!("keyword {}", id)))?;
                if keyword.status == KeywordStatus::Generating {
                    return Err(AppError::Conflict(format!(
                        "keyword '{}' is already being generated",
                        keyword.text
                    )));
                }
                keyword
            }
            None => self
                .keywords
                .next_pending(website_id)
                .await?
                .ok_or(AppError::NoEligibleKeyword(website_id))?,
        };

        let input = JobInput {
            keyword: keyword.text.clone(),
            content_length: options.content_length,
            include_images: options.include_images,
            include_faq: options.include_faq,
            auto_publish: options.auto_publish,
        };
        // The store's in-flight check decides overlapping requests; only the
        // winner touches the keyword
        let job = self
            .jobs
            .enqueue(NewJob {
                website_id,
                keyword_id: Some(keyword.id),
                input,
                retry_of: None,
            })
            .await?;

        if let Err(e) = self
            .keywords
            .set_status(keyword.id, KeywordStatus::Generating)
            .await
        {
            warn!(job_id = %job.id, keyword_id = %keyword.id, error = %e, "Could not mark keyword generating");
        }
        info!(job_id = %job.id, keyword = %keyword.text, "Generation requested");
        Ok(job)
    }

    /// Re-run a `FAILED` job from the first stage as a new job.
    pub async fn retry(&self, job_id: Uuid) -> AppResult<GenerationJob> {
        let replacement = self.jobs.retry(job_id).await?;
        if let Some(keyword_id) = replacement.keyword_id {
            if let Err(e) = self
                .keywords
                .set_status(keyword_id, KeywordStatus::Generating)
                .await
            {
                warn!(job_id = %replacement.id, error = %e, "Could not mark keyword generating");
            }
        }
        info!(job_id = %job_id, retry_id = %replacement.id, "Retry requested");
        Ok(replacement)
    }

    /// Returns as soon as the request is recorded; a running job stops at its
    /// next stage boundary.
    pub async fn cancel(&self, job_id: Uuid) -> AppResult<(CancelOutcome, GenerationJob)> {
        let (outcome, job) = self.jobs.cancel(job_id).await?;
        if outcome == CancelOutcome::Cancelled {
            if let Some(keyword_id) = job.keyword_id {
                if let Err(e) = self
                    .keywords
                    .set_status(keyword_id, KeywordStatus::Pending)
                    .await
                {
                    warn!(%job_id, error = %e, "Could not restore keyword");
                }
            }
        }
        info!(%job_id, ?outcome, "Cancel requested");
        Ok((outcome, job))
    }

    pub async fn list(&self, website_id: Uuid) -> AppResult<Vec<GenerationJob>> {
        self.jobs.list_by_website(website_id).await
    }

    pub async fn get(&self, job_id: Uuid) -> AppResult<GenerationJob> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{InMemoryContentStore, Keyword};
    use crate::pipeline::testing::{fake_executor, Behavior, FakeAgent, Harness};
    use crate::queue::{JobStatus, Stage};

    fn control(harness: &Harness) -> ControlSurface {
        ControlSurface::new(
            harness.jobs.clone(),
            harness.content.clone(),
            harness.content.clone(),
        )
    }

    #[tokio::test]
    async fn test_generate_picks_highest_priority_pending() {
        let harness = Harness::new().await;
        let urgent = Keyword::new(harness.website.id, "receipt templates", 50);
        harness.content.insert_keyword(urgent.clone()).await;

        let job = control(&harness)
            .generate(harness.website.id, None, GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(job.keyword_id, Some(urgent.id));
        assert_eq!(job.input.keyword, "receipt templates");
        assert_eq!(job.status, JobStatus::Queued);

        let stored = KeywordStore::get(harness.content.as_ref(), urgent.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, KeywordStatus::Generating);
    }

    #[tokio::test]
    async fn test_generate_without_pending_keyword() {
        let harness = Harness::new().await;
        let control = control(&harness);
        control
            .generate(harness.website.id, None, GenerateOptions::default())
            .await
            .unwrap();

        let err = control
            .generate(harness.website.id, None, GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoEligibleKeyword(_)));
    }

    #[tokio::test]
    async fn test_back_to_back_generate_conflicts() {
        let harness = Harness::new().await;
        let control = control(&harness);
        let keyword_id = Some(harness.keyword.id);

        control
            .generate(harness.website.id, keyword_id, GenerateOptions::default())
            .await
            .unwrap();
        let err = control
            .generate(harness.website.id, keyword_id, GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let active = control
            .list(harness.website.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|j| j.status.is_active())
            .count();
        assert_eq!(active, 1);
    }

    #[tokio::test]
    async fn test_failed_enqueue_leaves_keyword_untouched() {
        let harness = Harness::new().await;
        // An in-flight job for the same text that never touched the keyword
        harness
            .jobs
            .enqueue(NewJob {
                website_id: harness.website.id,
                keyword_id: None,
                input: JobInput::new("Invoice Templates "),
                retry_of: None,
            })
            .await
            .unwrap();

        let err = control(&harness)
            .generate(harness.website.id, Some(harness.keyword.id), GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(harness.keyword_status().await, KeywordStatus::Pending);
    }

    /// Keyword reads that take long enough for two requests to overlap.
    struct SlowKeywords(Arc<InMemoryContentStore>);

    #[async_trait::async_trait]
    impl KeywordStore for SlowKeywords {
        async fn get(&self, keyword_id: Uuid) -> AppResult<Option<Keyword>> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            KeywordStore::get(self.0.as_ref(), keyword_id).await
        }

        async fn next_pending(&self, website_id: Uuid) -> AppResult<Option<Keyword>> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.0.next_pending(website_id).await
        }

        async fn set_status(&self, keyword_id: Uuid, status: KeywordStatus) -> AppResult<()> {
            self.0.set_status(keyword_id, status).await
        }
    }

    #[tokio::test]
    async fn test_overlapping_generate_keeps_keyword_generating() {
        let harness = Harness::new().await;
        let control = ControlSurface::new(
            harness.jobs.clone(),
            Arc::new(SlowKeywords(harness.content.clone())),
            harness.content.clone(),
        );
        let website_id = harness.website.id;
        let keyword_id = Some(harness.keyword.id);

        let (a, b) = tokio::join!(
            control.generate(website_id, keyword_id, GenerateOptions::default()),
            control.generate(website_id, keyword_id, GenerateOptions::default()),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert!(matches!(a.err().or(b.err()), Some(AppError::Conflict(_))));

        let active = control
            .list(website_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|j| j.status.is_active())
            .count();
        assert_eq!(active, 1);
        assert_eq!(harness.keyword_status().await, KeywordStatus::Generating);
    }

    #[tokio::test]
    async fn test_overlapping_auto_pick_keeps_keyword_generating() {
        let harness = Harness::new().await;
        let control = ControlSurface::new(
            harness.jobs.clone(),
            Arc::new(SlowKeywords(harness.content.clone())),
            harness.content.clone(),
        );
        let website_id = harness.website.id;

        let (a, b) = tokio::join!(
            control.generate(website_id, None, GenerateOptions::default()),
            control.generate(website_id, None, GenerateOptions::default()),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert_eq!(harness.keyword_status().await, KeywordStatus::Generating);
    }

    #[tokio::test]
    async fn test_unknown_website_or_keyword() {
        let harness = Harness::new().await;
        let control = control(&harness);
        assert!(matches!(
            control
                .generate(Uuid::new_v4(), None, GenerateOptions::default())
                .await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            control
                .generate(harness.website.id, Some(Uuid::new_v4()), GenerateOptions::default())
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_queued_job_never_runs_a_stage() {
        let harness = Harness::new().await;
        let control = control(&harness);

        let job = control
            .generate(harness.website.id, None, GenerateOptions::default())
            .await
            .unwrap();
        let (outcome, cancelled) = control.cancel(job.id).await.unwrap();
        assert_eq!(outcome, CancelOutcome::Cancelled);
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert_eq!(harness.keyword_status().await, KeywordStatus::Pending);

        // Nothing left for a worker to claim
        assert!(harness.jobs.claim_next().await.unwrap().is_none());

        // Terminal jobs cannot be cancelled again
        assert!(matches!(
            control.cancel(job.id).await,
            Err(AppError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_processing_job_only_raises_flag() {
        let harness = Harness::new().await;
        let control = control(&harness);
        let job = control
            .generate(harness.website.id, None, GenerateOptions::default())
            .await
            .unwrap();
        harness.jobs.claim_next().await.unwrap().unwrap();

        let (outcome, stored) = control.cancel(job.id).await.unwrap();
        assert_eq!(outcome, CancelOutcome::Requested);
        assert_eq!(stored.status, JobStatus::Processing);
        assert!(stored.cancel_requested);
        assert_eq!(harness.keyword_status().await, KeywordStatus::Generating);
    }

    #[tokio::test]
    async fn test_retry_rules() {
        let harness = Harness::new().await;
        let executor = fake_executor().with_agent(FakeAgent::times(
            Stage::Draft,
            Behavior::Fail(|| AppError::Timeout("provider".to_string())),
            1,
        ));
        let orchestrator = harness.orchestrator(executor);
        let control = control(&harness);

        let job = control
            .generate(harness.website.id, None, GenerateOptions::default())
            .await
            .unwrap();
        // Not failed yet
        assert!(matches!(
            control.retry(job.id).await,
            Err(AppError::InvalidTransition(_))
        ));

        let claimed = harness.jobs.claim_next().await.unwrap().unwrap();
        orchestrator.drive(claimed).await.unwrap();
        assert_eq!(harness.keyword_status().await, KeywordStatus::Pending);

        let retry = control.retry(job.id).await.unwrap();
        assert_eq!(retry.status, JobStatus::Queued);
        assert_eq!(retry.retry_of, Some(job.id));
        assert_eq!(harness.keyword_status().await, KeywordStatus::Generating);

        // The original stays inspectable and cannot be retried twice
        let original = control.get(job.id).await.unwrap();
        assert_eq!(original.status, JobStatus::Failed);
        assert!(matches!(
            control.retry(job.id).await,
            Err(AppError::InvalidTransition(_))
        ));

        let claimed = harness.jobs.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, retry.id);
        orchestrator.drive(claimed).await.unwrap();
        assert_eq!(control.get(retry.id).await.unwrap().status, JobStatus::Completed);
        assert_eq!(harness.keyword_status().await, KeywordStatus::Used);
    }
}
