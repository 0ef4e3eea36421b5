//! Fake stage agents and a wired-up in-memory pipeline for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::agents::{ArticleMetadata, Outline, OutlineSection, ResearchBrief, SeoAgent};
use crate::content::{
    FeaturedImage, InMemoryContentStore, Keyword, KeywordStatus, KeywordStore, NoopPublisher,
    SocialCaptions, WebsiteConfig,
};
use crate::pipeline::{Orchestrator, StageAgent, StageExecutor, StageInput, StageOutput};
use crate::queue::{GenerationJob, InMemoryJobStore, JobInput, JobStore, NewJob, Stage};
use crate::types::{AppError, AppResult};

pub(crate) enum Behavior {
    Succeed,
    Fail(fn() -> AppError),
    Sleep(Duration),
    /// Request cancellation of the running job, then succeed
    Cancel(Arc<dyn JobStore>),
}

/// Returns canned output for its stage unless told to misbehave.
pub(crate) struct FakeAgent {
    stage: Stage,
    behavior: Behavior,
    /// Misbehave on this many calls, then succeed
    misbehave_times: AtomicUsize,
    pub(crate) calls: AtomicUsize,
}

impl FakeAgent {
    pub(crate) fn new(stage: Stage, behavior: Behavior) -> Arc<Self> {
        Self::times(stage, behavior, usize::MAX)
    }

    pub(crate) fn times(stage: Stage, behavior: Behavior, times: usize) -> Arc<Self> {
        Arc::new(Self {
            stage,
            behavior,
            misbehave_times: AtomicUsize::new(times),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl StageAgent for FakeAgent {
    fn stage(&self) -> Stage {
        self.stage
    }

    async fn run(&self, input: StageInput<'_>) -> AppResult<StageOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let misbehave = self
            .misbehave_times
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if misbehave {
            match &self.behavior {
                Behavior::Succeed => {}
                Behavior::Fail(make) => return Err(make()),
                Behavior::Sleep(d) => tokio::time::sleep(*d).await,
                Behavior::Cancel(store) => {
                    store.cancel(input.job.id).await?;
                }
            }
        }
        Ok(canned_output(self.stage, input))
    }
}

pub(crate) fn canned_output(stage: Stage, input: StageInput<'_>) -> StageOutput {
    let keyword = input.job.input.keyword.clone();
    let title = format!("The Complete Guide to {}", keyword);
    let body = format!(
        "# {}\n\n{} explained for busy teams.\n\n## Basics\nText.\n\n## Tips\nMore text.",
        title, keyword
    );

    match stage {
        Stage::Research => StageOutput::Research(ResearchBrief {
            summary: format!("What people want to know about {}", keyword),
            key_points: vec!["point".to_string()],
            questions: vec!["why?".to_string()],
            competitor_angles: vec![],
        }),
        Stage::Outline => StageOutput::Outline(Outline {
            title: title.clone(),
            sections: vec![OutlineSection {
                heading: "Basics".to_string(),
                points: vec![],
            }],
        }),
        Stage::Draft => StageOutput::Draft(body),
        Stage::Tone => StageOutput::Tone(body),
        Stage::Seo => StageOutput::Seo(SeoAgent::optimize(
            input.context.latest_body().unwrap_or(&body),
            &keyword,
            &title,
            &input.website.internal_links,
        )),
        Stage::Metadata => StageOutput::Metadata(ArticleMetadata {
            slug: crate::agents::slugify(&title),
            meta_title: title.clone(),
            meta_description: format!("Everything about {}", keyword),
            social: SocialCaptions::default(),
            tags: vec![keyword.to_lowercase()],
            title,
        }),
        Stage::Image => StageOutput::Image(FeaturedImage {
            url: "https://cdn.example.com/featured.png".to_string(),
            alt: keyword,
        }),
    }
}

/// All seven stages succeed instantly.
pub(crate) fn fake_executor() -> StageExecutor {
    fake_executor_with_timeouts(Duration::from_secs(5), Duration::from_secs(5))
}

pub(crate) fn fake_executor_with_timeouts(timeout: Duration, long_timeout: Duration) -> StageExecutor {
    Stage::ALL.iter().fold(
        StageExecutor::with_timeouts(timeout, long_timeout),
        |executor, stage| executor.with_agent(FakeAgent::new(*stage, Behavior::Succeed)),
    )
}

pub(crate) fn test_job(include_images: bool) -> GenerationJob {
    let mut input = JobInput::new("invoice templates");
    input.include_images = include_images;
    GenerationJob::new(NewJob {
        website_id: Uuid::new_v4(),
        keyword_id: None,
        input,
        retry_of: None,
    })
}

/// One website with one pending keyword, backed by in-memory stores.
pub(crate) struct Harness {
    pub(crate) jobs: Arc<dyn JobStore>,
    pub(crate) content: Arc<InMemoryContentStore>,
    pub(crate) website: WebsiteConfig,
    pub(crate) keyword: Keyword,
}

impl Harness {
    pub(crate) async fn new() -> Self {
        Self::with_jobs(Arc::new(InMemoryJobStore::new())).await
    }

    pub(crate) async fn with_jobs(jobs: Arc<dyn JobStore>) -> Self {
        let content = Arc::new(InMemoryContentStore::new());
        let website = WebsiteConfig::new("Acme Invoicing");
        let keyword = Keyword::new(website.id, "invoice templates", 10);
        content.insert_website(website.clone()).await;
        content.insert_keyword(keyword.clone()).await;
        Self {
            jobs,
            content,
            website,
            keyword,
        }
    }

    pub(crate) fn orchestrator(&self, executor: StageExecutor) -> Orchestrator {
        Orchestrator::new(
            self.jobs.clone(),
            self.content.clone(),
            self.content.clone(),
            self.content.clone(),
            Arc::new(NoopPublisher),
            executor,
        )
    }

    /// Enqueue a job for the harness keyword the way the control surface does.
    pub(crate) async fn enqueue(&self, include_images: bool) -> GenerationJob {
        let mut input = JobInput::new(self.keyword.text.clone());
        input.include_images = include_images;
        self.content
            .set_status(self.keyword.id, KeywordStatus::Generating)
            .await
            .unwrap();
        self.jobs
            .enqueue(NewJob {
                website_id: self.website.id,
                keyword_id: Some(self.keyword.id),
                input,
                retry_of: None,
            })
            .await
            .unwrap()
    }

    pub(crate) async fn keyword_status(&self) -> KeywordStatus {
        KeywordStore::get(self.content.as_ref(), self.keyword.id)
            .await
            .unwrap()
            .unwrap()
            .status
    }
}
