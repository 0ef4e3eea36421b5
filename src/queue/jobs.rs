//! Generation job model and its state machine.
//!
//! A job moves `QUEUED → PROCESSING → {COMPLETED, FAILED}`, and may be
//! cancelled from either non-terminal state. While `PROCESSING` it walks the
//! seven [`Stage`]s strictly in order. The transition methods here are the
//! single source of truth for legality; the in-memory store applies them
//! directly and the Postgres store mirrors them as conditional updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AppError, AppResult};

/// The fixed pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Research,
    Outline,
    Draft,
    Tone,
    Seo,
    Metadata,
    Image,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Research,
        Stage::Outline,
        Stage::Draft,
        Stage::Tone,
        Stage::Seo,
        Stage::Metadata,
        Stage::Image,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn first() -> Stage {
        Stage::Research
    }

    /// Zero-based position in the fixed order
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Stage> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn is_last(self) -> bool {
        self.next().is_none()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Research => "research",
            Stage::Outline => "outline",
            Stage::Draft => "draft",
            Stage::Tone => "tone",
            Stage::Seo => "seo",
            Stage::Metadata => "metadata",
            Stage::Image => "image",
        }
    }

    pub fn parse(value: &str) -> Option<Stage> {
        Self::ALL.iter().copied().find(|s| s.as_str() == value)
    }

    /// Progress once this stage has finished: `⌊100·(i+1)/7⌋`.
    pub fn completed_percent(self) -> u8 {
        progress_after(self.index() + 1)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress after `completed` stages have finished.
pub fn progress_after(completed: usize) -> u8 {
    let completed = completed.min(Stage::COUNT);
    (100 * completed / Stage::COUNT) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<JobStatus> {
        match value {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentLength {
    Short,
    #[default]
    Medium,
    Long,
}

/// Immutable snapshot of the request, taken at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInput {
    pub keyword: String,
    #[serde(default)]
    pub content_length: ContentLength,
    #[serde(default = "default_true")]
    pub include_images: bool,
    #[serde(default = "default_true")]
    pub include_faq: bool,
    #[serde(default)]
    pub auto_publish: bool,
}

fn default_true() -> bool {
    true
}

impl JobInput {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            content_length: ContentLength::default(),
            include_images: true,
            include_faq: true,
            auto_publish: false,
        }
    }

    /// Key used for the one-in-flight-per-keyword rule
    pub fn keyword_key(&self) -> String {
        self.keyword.trim().to_lowercase()
    }
}

/// Parameters for creating a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub website_id: Uuid,
    pub keyword_id: Option<Uuid>,
    pub input: JobInput,
    pub retry_of: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJob {
    pub id: Uuid,
    pub website_id: Uuid,
    pub keyword_id: Option<Uuid>,
    pub input: JobInput,
    pub status: JobStatus,
    pub current_stage: Option<Stage>,
    pub progress: u8,
    pub cancel_requested: bool,
    pub article_id: Option<Uuid>,
    pub error: Option<String>,
    pub failed_stage: Option<Stage>,
    pub retry_of: Option<Uuid>,
    pub retried_as: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stage_started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationJob {
    pub fn new(new_job: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            website_id: new_job.website_id,
            keyword_id: new_job.keyword_id,
            input: new_job.input,
            status: JobStatus::Queued,
            current_stage: None,
            progress: 0,
            cancel_requested: false,
            article_id: None,
            error: None,
            failed_stage: None,
            retry_of: new_job.retry_of,
            retried_as: None,
            created_at: now,
            started_at: None,
            stage_started_at: None,
            finished_at: None,
            updated_at: now,
        }
    }

    /// Whether `other` targets the same keyword of the same website.
    pub fn same_keyword(&self, website_id: Uuid, input: &JobInput) -> bool {
        self.website_id == website_id && self.input.keyword_key() == input.keyword_key()
    }

    fn expect_status(&self, allowed: &[JobStatus], action: &str) -> AppResult<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition(format!(
                "cannot {} job {} while {}",
                action, self.id, self.status
            )))
        }
    }

    /// `QUEUED → PROCESSING`, entering the first stage.
    pub fn claim(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.expect_status(&[JobStatus::Queued], "claim")?;
        self.status = JobStatus::Processing;
        self.current_stage = Some(Stage::first());
        self.progress = 0;
        self.started_at = Some(now);
        self.stage_started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Enter `stage` with `percent` done. Neither may move backwards.
    pub fn advance(&mut self, stage: Stage, percent: u8, now: DateTime<Utc>) -> AppResult<()> {
        self.expect_status(&[JobStatus::Processing], "record progress for")?;
        if percent > 100 {
            return Err(AppError::InvalidRequest(format!(
                "progress {} is out of range",
                percent
            )));
        }
        if percent < self.progress {
            return Err(AppError::InvalidTransition(format!(
                "progress for job {} cannot regress from {} to {}",
                self.id, self.progress, percent
            )));
        }
        if let Some(current) = self.current_stage {
            if stage < current {
                return Err(AppError::InvalidTransition(format!(
                    "job {} cannot move back from stage {} to {}",
                    self.id, current, stage
                )));
            }
        }
        if self.current_stage != Some(stage) {
            self.stage_started_at = Some(now);
        }
        self.current_stage = Some(stage);
        self.progress = percent;
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, article_id: Uuid, now: DateTime<Utc>) -> AppResult<()> {
        self.expect_status(&[JobStatus::Processing], "complete")?;
        self.status = JobStatus::Completed;
        self.current_stage = Some(Stage::ALL[Stage::COUNT - 1]);
        self.progress = 100;
        self.article_id = Some(article_id);
        self.finished_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn fail(&mut self, stage: Stage, error: &str, now: DateTime<Utc>) -> AppResult<()> {
        self.expect_status(&[JobStatus::Processing], "fail")?;
        self.status = JobStatus::Failed;
        self.failed_stage = Some(stage);
        self.error = Some(error.to_string());
        self.finished_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Cancel request. A queued job stops immediately; a processing job only
    /// gets its flag raised and is stopped at the next stage boundary.
    pub fn request_cancel(&mut self, now: DateTime<Utc>) -> AppResult<CancelOutcome> {
        self.expect_status(&[JobStatus::Queued, JobStatus::Processing], "cancel")?;
        self.updated_at = now;
        if self.status == JobStatus::Queued {
            self.status = JobStatus::Cancelled;
            self.finished_at = Some(now);
            Ok(CancelOutcome::Cancelled)
        } else {
            self.cancel_requested = true;
            Ok(CancelOutcome::Requested)
        }
    }

    /// `PROCESSING → CANCELLED` once the running pipeline observed the flag.
    pub fn finish_cancel(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.expect_status(&[JobStatus::Processing], "finish cancelling")?;
        if !self.cancel_requested {
            return Err(AppError::InvalidTransition(format!(
                "job {} has no pending cancellation",
                self.id
            )));
        }
        self.status = JobStatus::Cancelled;
        self.finished_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Lineage check and bookkeeping for a retry; returns the replacement job.
    pub fn spawn_retry(&mut self, now: DateTime<Utc>) -> AppResult<GenerationJob> {
        self.expect_status(&[JobStatus::Failed], "retry")?;
        if let Some(existing) = self.retried_as {
            return Err(AppError::InvalidTransition(format!(
                "job {} was already retried as {}",
                self.id, existing
            )));
        }
        let replacement = GenerationJob::new(NewJob {
            website_id: self.website_id,
            keyword_id: self.keyword_id,
            input: self.input.clone(),
            retry_of: Some(self.id),
        });
        self.retried_as = Some(replacement.id);
        self.updated_at = now;
        Ok(replacement)
    }

    /// Reset a run interrupted by a crash. Returns true when the job was
    /// requeued, false when a pending cancellation was honoured instead.
    pub fn recover(&mut self, now: DateTime<Utc>) -> AppResult<bool> {
        self.expect_status(&[JobStatus::Processing], "recover")?;
        self.updated_at = now;
        if self.cancel_requested {
            self.status = JobStatus::Cancelled;
            self.finished_at = Some(now);
            return Ok(false);
        }
        self.status = JobStatus::Queued;
        self.current_stage = None;
        self.progress = 0;
        self.started_at = None;
        self.stage_started_at = None;
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was queued and is now `CANCELLED`.
    Cancelled,
    /// The job is running; the flag will be observed at the next stage boundary.
    Requested,
}
