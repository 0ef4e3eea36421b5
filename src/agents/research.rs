//! Research Agent
//!
//! Gathers the source material the rest of the pipeline builds on: what the
//! keyword is about, what searchers want to know, and how competing articles
//! approach it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agents::extract_json;
use crate::content::WebsiteConfig;
use crate::llm::LLM;
use crate::pipeline::{StageAgent, StageInput, StageOutput};
use crate::queue::Stage;
use crate::types::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchBrief {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    /// Questions searchers ask; seeds the FAQ section
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub competitor_angles: Vec<String>,
}

pub struct ResearchAgent {
    llm: LLM,
}

impl ResearchAgent {
    pub fn new(llm: LLM) -> Self {
        Self { llm }
    }

    fn create_prompt(keyword: &str, website: &WebsiteConfig) -> String {
        let audience = website
            .target_audience
            .as_deref()
            .unwrap_or("a general audience");

        format!(
            r#"You are researching a blog article for the website "{site}", written for {audience}.

TARGET KEYWORD:
{keyword}

Provide:
1. A concise summary of what the topic covers and why people search for it
2. The key facts, steps or ideas an authoritative article must include
3. The questions searchers most often ask about it
4. How top-ranking competing articles approach the topic, and gaps they leave

OUTPUT FORMAT (respond with ONLY valid JSON):
{{
  "summary": "2-3 sentence overview",
  "key_points": ["point 1", "point 2"],
  "questions": ["question 1?", "question 2?"],
  "competitor_angles": ["angle 1", "angle 2"]
}}"#,
            site = website.name,
            audience = audience,
            keyword = keyword,
        )
    }

    pub fn parse_response(response: &str) -> AppResult<ResearchBrief> {
        let brief: ResearchBrief = extract_json(response)?;
        if brief.summary.trim().is_empty() {
            return Err(AppError::LLMApi("Research brief has an empty summary".to_string()));
        }
        Ok(brief)
    }
}

#[async_trait]
impl StageAgent for ResearchAgent {
    fn stage(&self) -> Stage {
        Stage::Research
    }

    async fn run(&self, input: StageInput<'_>) -> AppResult<StageOutput> {
        let keyword = &input.job.input.keyword;
        let prompt = Self::create_prompt(keyword, input.website);

        let response = self
            .llm
            .complete(
                "You are a meticulous SEO content researcher. Be factual and specific.",
                &prompt,
                1500,
                0.3,
            )
            .await?;

        let brief = Self::parse_response(&response)?;
        info!(
            job_id = %input.job.id,
            key_points = brief.key_points.len(),
            questions = brief.questions.len(),
            "Research complete"
        );
        Ok(StageOutput::Research(brief))
    }
}
