//! Draft Agent
//!
//! Writes the full markdown article from the outline, sized to the website's
//! word target for the requested length tier.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::agents::{require, strip_markdown_fence, word_count};
use crate::llm::LLM;
use crate::pipeline::{StageAgent, StageInput, StageOutput};
use crate::queue::Stage;
use crate::types::{AppError, AppResult};

/// Drafts shorter than this share of the target are treated as truncated.
const MIN_TARGET_RATIO: f32 = 0.4;

pub struct DraftAgent {
    llm: LLM,
}

impl DraftAgent {
    pub fn new(llm: LLM) -> Self {
        Self { llm }
    }

    fn create_prompt(input: &StageInput<'_>, outline_md: &str, target_words: u32) -> String {
        let job_input = &input.job.input;
        let audience = input
            .website
            .target_audience
            .as_deref()
            .unwrap_or("a general audience");
        let faq_rule = if job_input.include_faq {
            "Answer each FAQ question in 2-3 sentences under its own ### heading."
        } else {
            "Do not add an FAQ section."
        };

        format!(
            r#"Write a complete blog article in markdown following this outline.

OUTLINE:
{outline}

REQUIREMENTS:
- Target length: about {target} words
- Audience: {audience}
- Use the keyword "{keyword}" naturally in the first paragraph and a few times throughout
- Start with a single `#` title, then use `##` for each outline section
- {faq_rule}
- Return only the article markdown, no commentary"#,
            outline = outline_md,
            target = target_words,
            audience = audience,
            keyword = job_input.keyword,
            faq_rule = faq_rule,
        )
    }

    pub fn check_length(draft: &str, target_words: u32) -> AppResult<u32> {
        let words = word_count(draft);
        let minimum = (target_words as f32 * MIN_TARGET_RATIO) as u32;
        if words < minimum {
            return Err(AppError::LLMApi(format!(
                "Draft has {} words, expected at least {} of {}",
                words, minimum, target_words
            )));
        }
        Ok(words)
    }
}

#[async_trait]
impl StageAgent for DraftAgent {
    fn stage(&self) -> Stage {
        Stage::Draft
    }

    async fn run(&self, input: StageInput<'_>) -> AppResult<StageOutput> {
        let outline = require(input.context.outline.as_ref(), Stage::Draft, "an outline")?;
        let target_words = input
            .website
            .content_lengths
            .word_target(input.job.input.content_length);

        let prompt = Self::create_prompt(&input, &outline.to_markdown(), target_words);
        // Roughly 1.5 tokens per word plus headroom for markdown
        let max_tokens = (target_words * 2).max(1024);
        let response = self
            .llm
            .complete(
                "You are a senior content writer producing clear, well-structured, original articles.",
                &prompt,
                max_tokens,
                0.7,
            )
            .await?;

        let draft = strip_markdown_fence(&response);
        let words = Self::check_length(&draft, target_words)?;
        if words < target_words / 2 {
            warn!(job_id = %input.job.id, words, target_words, "Draft came in well under target");
        }

        info!(job_id = %input.job.id, words, target_words, "Draft complete");
        Ok(StageOutput::Draft(draft))
    }
}
