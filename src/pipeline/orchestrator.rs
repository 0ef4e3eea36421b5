//! Pipeline Orchestrator
//!
//! Drives one claimed job through the seven stages:
//!
//! ```text
//! for stage in research..=image:
//!     cancel requested?  → CANCELLED, keyword → PENDING
//!     run stage          → error: FAILED(stage), keyword → PENDING
//!     record progress
//! cancel requested?      → CANCELLED, keyword → PENDING
//! save article           → COMPLETED, keyword → USED, publish if asked
//! ```
//!
//! Stage outputs live only in this run's [`PipelineContext`]; a retry starts
//! over from research.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::content::{ArticleStore, KeywordStatus, KeywordStore, PublishHook, WebsiteStore};
use crate::pipeline::executor::StageExecutor;
use crate::pipeline::stage::PipelineContext;
use crate::queue::{GenerationJob, JobStore, Stage};
use crate::types::AppResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { article_id: Uuid },
    Failed { stage: Stage, error: String },
    /// `at_stage` is the stage that would have run next
    Cancelled { at_stage: Option<Stage> },
}

pub struct Orchestrator {
    jobs: Arc<dyn JobStore>,
    keywords: Arc<dyn KeywordStore>,
    websites: Arc<dyn WebsiteStore>,
    articles: Arc<dyn ArticleStore>,
    publisher: Arc<dyn PublishHook>,
    executor: StageExecutor,
}

impl Orchestrator {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        keywords: Arc<dyn KeywordStore>,
        websites: Arc<dyn WebsiteStore>,
        articles: Arc<dyn ArticleStore>,
        publisher: Arc<dyn PublishHook>,
        executor: StageExecutor,
    ) -> Self {
        Self {
            jobs,
            keywords,
            websites,
            articles,
            publisher,
            executor,
        }
    }

    /// Run a `PROCESSING` job to a terminal state.
    ///
    /// Stage failures become a `FAILED` job, not an `Err`. An `Err` means the
    /// job store itself could not be updated; the job is then left
    /// `PROCESSING` for startup recovery to pick up.
    pub async fn drive(&self, job: GenerationJob) -> AppResult<JobOutcome> {
        info!(job_id = %job.id, keyword = %job.input.keyword, "Driving job");

        let website = match self.websites.get(job.website_id).await {
            Ok(Some(website)) => website,
            Ok(None) => {
                let message = format!("website {} not found", job.website_id);
                return self.fail(&job, Stage::first(), message).await;
            }
            Err(e) => {
                return self
                    .fail(&job, Stage::first(), format!("could not load website: {}", e))
                    .await
            }
        };

        let mut context = PipelineContext::default();
        let mut current = job.current_stage.or(Some(Stage::first()));

        while let Some(stage) = current {
            if self.jobs.is_cancel_requested(job.id).await? {
                return self.cancel(&job, Some(stage)).await;
            }

            let outcome = match self
                .executor
                .run_stage(stage, &job, &website, &context)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(job_id = %job.id, %stage, kind = %e.kind, error = %e.message, "Stage failed");
                    return self.fail(&job, stage, e.to_string()).await;
                }
            };

            context.absorb(outcome.output);
            let percent = stage.completed_percent();
            self.jobs
                .record_progress(job.id, outcome.next.unwrap_or(stage), percent)
                .await?;
            info!(job_id = %job.id, %stage, progress = percent, "Stage complete");

            current = outcome.next;
        }

        // A cancel that lands during the final stage still wins
        if self.jobs.is_cancel_requested(job.id).await? {
            return self.cancel(&job, None).await;
        }

        let article = match context.into_article(&job) {
            Ok(article) => article,
            Err(e) => return self.fail(&job, Stage::ALL[Stage::COUNT - 1], e.to_string()).await,
        };
        let article_id = match self.articles.save(&article).await {
            Ok(id) => id,
            Err(e) => {
                let message = format!("could not store article: {}", e);
                return self.fail(&job, Stage::ALL[Stage::COUNT - 1], message).await;
            }
        };

        self.jobs.complete(job.id, article_id).await?;
        self.set_keyword(&job, KeywordStatus::Used).await;
        info!(job_id = %job.id, %article_id, seo_score = article.seo_score, "Job completed");

        if job.input.auto_publish {
            let publisher = self.publisher.clone();
            tokio::spawn(async move {
                if let Err(e) = publisher.publish(&article, &website).await {
                    error!(article_id = %article.id, error = %e, "Auto-publish failed");
                }
            });
        }

        Ok(JobOutcome::Completed { article_id })
    }

    async fn fail(&self, job: &GenerationJob, stage: Stage, message: String) -> AppResult<JobOutcome> {
        self.jobs.fail(job.id, stage, &message).await?;
        self.set_keyword(job, KeywordStatus::Pending).await;
        Ok(JobOutcome::Failed {
            stage,
            error: message,
        })
    }

    async fn cancel(&self, job: &GenerationJob, at_stage: Option<Stage>) -> AppResult<JobOutcome> {
        self.jobs.finish_cancel(job.id).await?;
        self.set_keyword(job, KeywordStatus::Pending).await;
        info!(job_id = %job.id, ?at_stage, "Job cancelled");
        Ok(JobOutcome::Cancelled { at_stage })
    }

    /// Keyword bookkeeping never changes the job's outcome.
    async fn set_keyword(&self, job: &GenerationJob, status: KeywordStatus) {
        let Some(keyword_id) = job.keyword_id else {
            return;
        };
        if let Err(e) = self.keywords.set_status(keyword_id, status).await {
            warn!(job_id = %job.id, %keyword_id, status = status.as_str(), error = %e, "Could not update keyword status");
        }
    }
}
