//! Stage Executor
//!
//! Runs exactly one stage for a job: looks up the stage's agent, applies the
//! input-flag skip rules, and bounds the call with the stage's timeout.
//! Every failure comes back as a classified [`StageError`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::agents::{
    DraftAgent, ImageAgent, MetadataAgent, OutlineAgent, ResearchAgent, SeoAgent, ToneAgent,
};
use crate::config::WorkerConfig;
use crate::content::WebsiteConfig;
use crate::llm::{ImageGenerator, LLM};
use crate::pipeline::stage::{
    PipelineContext, StageAgent, StageError, StageErrorKind, StageInput, StageOutcome, StageOutput,
};
use crate::queue::{GenerationJob, Stage};

pub struct StageExecutor {
    agents: HashMap<Stage, Arc<dyn StageAgent>>,
    timeout: Duration,
    long_timeout: Duration,
}

impl StageExecutor {
    /// An executor with no agents registered, using the worker's timeouts.
    pub fn new(config: &WorkerConfig) -> Self {
        Self::with_timeouts(
            config.stage_timeout(Stage::Research),
            config.stage_timeout(Stage::Draft),
        )
    }

    /// `long_timeout` applies to the draft and image stages.
    pub fn with_timeouts(timeout: Duration, long_timeout: Duration) -> Self {
        Self {
            agents: HashMap::new(),
            timeout,
            long_timeout,
        }
    }

    /// Register `agent` for the stage it reports, replacing any previous one.
    pub fn with_agent(mut self, agent: Arc<dyn StageAgent>) -> Self {
        self.agents.insert(agent.stage(), agent);
        self
    }

    /// The production line-up. Without an image generator the image stage
    /// has no agent and fails any job that asks for images.
    pub fn standard(
        llm: LLM,
        images: Option<Arc<dyn ImageGenerator>>,
        config: &WorkerConfig,
    ) -> Self {
        let mut executor = Self::new(config)
            .with_agent(Arc::new(ResearchAgent::new(llm.clone())))
            .with_agent(Arc::new(OutlineAgent::new(llm.clone())))
            .with_agent(Arc::new(DraftAgent::new(llm.clone())))
            .with_agent(Arc::new(ToneAgent::new(llm.clone())))
            .with_agent(Arc::new(SeoAgent::new()))
            .with_agent(Arc::new(MetadataAgent::new(llm)));

        if let Some(generator) = images {
            executor = executor.with_agent(Arc::new(ImageAgent::new(generator)));
        }
        executor
    }

    pub fn timeout_for(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Draft | Stage::Image => self.long_timeout,
            _ => self.timeout,
        }
    }

    /// Whether the job's input flags disable `stage`.
    pub fn should_skip(stage: Stage, job: &GenerationJob) -> bool {
        matches!(stage, Stage::Image) && !job.input.include_images
    }

    pub async fn run_stage(
        &self,
        stage: Stage,
        job: &GenerationJob,
        website: &WebsiteConfig,
        context: &PipelineContext,
    ) -> Result<StageOutcome, StageError> {
        let next = stage.next();

        if Self::should_skip(stage, job) {
            info!(job_id = %job.id, %stage, "Stage skipped by job input");
            return Ok(StageOutcome {
                output: StageOutput::Skipped,
                next,
            });
        }

        let agent = self.agents.get(&stage).ok_or_else(|| {
            StageError::new(
                stage,
                StageErrorKind::Permanent,
                format!("no agent is configured for the {} stage", stage),
            )
        })?;

        let limit = self.timeout_for(stage);
        let input = StageInput {
            job,
            website,
            context,
        };

        debug!(job_id = %job.id, %stage, timeout_secs = limit.as_secs(), "Running stage");
        let output = match tokio::time::timeout(limit, agent.run(input)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(StageError::from_app(stage, &e)),
            Err(_) => {
                return Err(StageError::new(
                    stage,
                    StageErrorKind::Timeout,
                    format!("timed out after {}s", limit.as_secs_f32()),
                ))
            }
        };

        Ok(StageOutcome { output, next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{fake_executor, test_job, Behavior, FakeAgent};
    use crate::types::AppError;

    #[tokio::test]
    async fn test_runs_stage_and_reports_next() {
        let executor = fake_executor();
        let job = test_job(true);
        let website = WebsiteConfig::new("Acme");
        let outcome = executor
            .run_stage(Stage::Research, &job, &website, &PipelineContext::default())
            .await
            .unwrap();
        assert!(matches!(outcome.output, StageOutput::Research(_)));
        assert_eq!(outcome.next, Some(Stage::Outline));
    }

    #[tokio::test]
    async fn test_image_skipped_when_disabled() {
        let executor = fake_executor();
        let job = test_job(false);
        let website = WebsiteConfig::new("Acme");
        let outcome = executor
            .run_stage(Stage::Image, &job, &website, &PipelineContext::default())
            .await
            .unwrap();
        assert_eq!(outcome.output, StageOutput::Skipped);
        assert_eq!(outcome.next, None);
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        let executor = fake_executor()
            .with_agent(FakeAgent::new(
                Stage::Tone,
                Behavior::Sleep(Duration::from_secs(5)),
            ));
        let executor = StageExecutor {
            timeout: Duration::from_millis(20),
            ..executor
        };
        let err = executor
            .run_stage(Stage::Tone, &test_job(true), &WebsiteConfig::new("Acme"), &PipelineContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Tone);
        assert_eq!(err.kind, StageErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_agent_errors_are_classified() {
        let executor = fake_executor().with_agent(FakeAgent::new(
            Stage::Outline,
            Behavior::Fail(|| AppError::RateLimited("429".to_string())),
        ));
        let err = executor
            .run_stage(Stage::Outline, &test_job(true), &WebsiteConfig::new("Acme"), &PipelineContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, StageErrorKind::Transient);
    }

    #[tokio::test]
    async fn test_missing_agent_is_permanent() {
        let executor = StageExecutor::new(&WorkerConfig::default());
        let err = executor
            .run_stage(Stage::Draft, &test_job(true), &WebsiteConfig::new("Acme"), &PipelineContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, StageErrorKind::Permanent);
    }

    #[test]
    fn test_long_stages_get_long_timeout() {
        let executor = StageExecutor::new(&WorkerConfig::default());
        assert_eq!(executor.timeout_for(Stage::Research), Duration::from_secs(120));
        assert_eq!(executor.timeout_for(Stage::Draft), Duration::from_secs(300));
        assert_eq!(executor.timeout_for(Stage::Image), Duration::from_secs(300));
    }
}
