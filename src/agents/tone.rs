//! Tone Agent
//!
//! Rewrites the draft in the website's brand voice. Sites without a brand
//! voice get the draft back unchanged and no provider call is made.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::agents::{require, strip_markdown_fence, word_count};
use crate::llm::LLM;
use crate::pipeline::{StageAgent, StageInput, StageOutput};
use crate::queue::Stage;
use crate::types::AppResult;

pub struct ToneAgent {
    llm: LLM,
}

impl ToneAgent {
    pub fn new(llm: LLM) -> Self {
        Self { llm }
    }

    fn create_prompt(draft: &str, brand_voice: &str) -> String {
        format!(
            r#"Rewrite the article below in this brand voice:

BRAND VOICE:
{voice}

RULES:
- Keep every heading, fact, list and link
- Keep the markdown structure and roughly the same length
- Return only the rewritten markdown

ARTICLE:
{draft}"#,
            voice = brand_voice,
            draft = draft,
        )
    }
}

#[async_trait]
impl StageAgent for ToneAgent {
    fn stage(&self) -> Stage {
        Stage::Tone
    }

    async fn run(&self, input: StageInput<'_>) -> AppResult<StageOutput> {
        let draft = require(input.context.draft.as_ref(), Stage::Tone, "a draft")?;

        let voice = match input.website.brand_voice.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => v,
            _ => {
                info!(job_id = %input.job.id, "No brand voice configured, keeping draft");
                return Ok(StageOutput::Tone(draft.clone()));
            }
        };

        let draft_words = word_count(draft);
        let response = self
            .llm
            .complete(
                "You are an editor who adapts articles to a brand's voice without losing substance.",
                &Self::create_prompt(draft, voice),
                (draft_words * 2).max(1024),
                0.5,
            )
            .await?;

        let rewritten = strip_markdown_fence(&response);
        if word_count(&rewritten) < draft_words / 2 {
            warn!(
                job_id = %input.job.id,
                draft_words,
                rewritten_words = word_count(&rewritten),
                "Tone rewrite dropped too much content, keeping draft"
            );
            return Ok(StageOutput::Tone(draft.clone()));
        }

        Ok(StageOutput::Tone(rewritten))
    }
}
