//! Stage contract shared by the executor and the agents.

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::agents::{ArticleMetadata, Outline, ResearchBrief, SeoReport};
use crate::content::{Article, FeaturedImage, WebsiteConfig};
use crate::queue::{GenerationJob, Stage};
use crate::types::{AppError, AppResult};

/// Everything a stage may read. Stages never write anywhere; they only
/// return a [`StageOutput`].
#[derive(Clone, Copy)]
pub struct StageInput<'a> {
    pub job: &'a GenerationJob,
    pub website: &'a WebsiteConfig,
    pub context: &'a PipelineContext,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Research(ResearchBrief),
    Outline(Outline),
    Draft(String),
    Tone(String),
    Seo(SeoReport),
    Metadata(ArticleMetadata),
    Image(FeaturedImage),
    /// The stage was disabled by the job's input flags
    Skipped,
}

/// Outputs accumulated over one run. Not persisted: a retry starts empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineContext {
    pub research: Option<ResearchBrief>,
    pub outline: Option<Outline>,
    pub draft: Option<String>,
    pub toned: Option<String>,
    pub seo: Option<SeoReport>,
    pub metadata: Option<ArticleMetadata>,
    pub image: Option<FeaturedImage>,
}

impl PipelineContext {
    pub fn absorb(&mut self, output: StageOutput) {
        match output {
            StageOutput::Research(brief) => self.research = Some(brief),
            StageOutput::Outline(outline) => self.outline = Some(outline),
            StageOutput::Draft(text) => self.draft = Some(text),
            StageOutput::Tone(text) => self.toned = Some(text),
            StageOutput::Seo(report) => self.seo = Some(report),
            StageOutput::Metadata(metadata) => self.metadata = Some(metadata),
            StageOutput::Image(image) => self.image = Some(image),
            StageOutput::Skipped => {}
        }
    }

    /// The most refined body available so far
    pub fn latest_body(&self) -> Option<&str> {
        self.seo
            .as_ref()
            .map(|s| s.content.as_str())
            .or(self.toned.as_deref())
            .or(self.draft.as_deref())
    }

    /// Assemble the finished article once every required stage has run.
    pub fn into_article(self, job: &GenerationJob) -> AppResult<Article> {
        let seo = self
            .seo
            .ok_or_else(|| AppError::Internal("article is missing seo output".to_string()))?;
        let metadata = self
            .metadata
            .ok_or_else(|| AppError::Internal("article is missing metadata".to_string()))?;

        Ok(Article {
            id: Uuid::new_v4(),
            website_id: job.website_id,
            keyword_id: job.keyword_id,
            job_id: job.id,
            title: metadata.title,
            slug: metadata.slug,
            content: seo.content,
            meta_title: metadata.meta_title,
            meta_description: metadata.meta_description,
            social: metadata.social,
            tags: metadata.tags,
            seo_score: seo.score,
            word_count: seo.word_count,
            featured_image: self.image,
            created_at: Utc::now(),
        })
    }
}

#[async_trait]
pub trait StageAgent: Send + Sync {
    fn stage(&self) -> Stage;

    async fn run(&self, input: StageInput<'_>) -> AppResult<StageOutput>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageErrorKind {
    /// Rate limits, provider outages: may succeed on a later attempt
    Transient,
    /// Bad input or unusable model output
    Permanent,
    /// The stage exceeded its time budget
    Timeout,
}

impl std::fmt::Display for StageErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageErrorKind::Transient => f.write_str("transient"),
            StageErrorKind::Permanent => f.write_str("permanent"),
            StageErrorKind::Timeout => f.write_str("timeout"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{stage} stage failed ({kind}): {message}")]
pub struct StageError {
    pub stage: Stage,
    pub kind: StageErrorKind,
    pub message: String,
}

impl StageError {
    pub fn new(stage: Stage, kind: StageErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }

    pub fn from_app(stage: Stage, err: &AppError) -> Self {
        let kind = match err {
            AppError::Timeout(_) => StageErrorKind::Timeout,
            e if e.is_transient() => StageErrorKind::Transient,
            _ => StageErrorKind::Permanent,
        };
        Self::new(stage, kind, err.to_string())
    }
}

/// Result of one successful stage invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub output: StageOutput,
    /// `None` after the final stage
    pub next: Option<Stage>,
}
