//! Outline Agent
//!
//! Turns the research brief into a heading structure for the draft.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agents::{extract_json, require, ResearchBrief};
use crate::llm::LLM;
use crate::pipeline::{StageAgent, StageInput, StageOutput};
use crate::queue::Stage;
use crate::types::{AppError, AppResult};

pub const FAQ_HEADING: &str = "Frequently Asked Questions";
const MAX_FAQ_QUESTIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub heading: String,
    #[serde(default)]
    pub points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    pub title: String,
    pub sections: Vec<OutlineSection>,
}

impl Outline {
    pub fn has_faq(&self) -> bool {
        self.sections.iter().any(|s| is_faq_heading(&s.heading))
    }

    pub fn to_markdown(&self) -> String {
        let mut output = format!("# {}\n", self.title);
        for section in &self.sections {
            output.push_str(&format!("\n## {}\n", section.heading));
            for point in &section.points {
                output.push_str(&format!("- {}\n", point));
            }
        }
        output
    }
}

fn is_faq_heading(heading: &str) -> bool {
    let lower = heading.to_lowercase();
    lower.contains("faq") || lower.contains("frequently asked")
}

pub struct OutlineAgent {
    llm: LLM,
}

impl OutlineAgent {
    pub fn new(llm: LLM) -> Self {
        Self { llm }
    }

    fn create_prompt(keyword: &str, research: &ResearchBrief, include_faq: bool) -> String {
        let faq_rule = if include_faq {
            "End with a \"Frequently Asked Questions\" section whose points are questions."
        } else {
            "Do NOT include an FAQ section."
        };

        format!(
            r#"Create an article outline for the keyword "{keyword}".

RESEARCH SUMMARY:
{summary}

KEY POINTS:
{points}

COMPETITOR ANGLES TO BEAT:
{angles}

RULES:
- A compelling title that contains the keyword
- 4 to 8 sections, each with 2-4 bullet points
- {faq_rule}

OUTPUT FORMAT (respond with ONLY valid JSON):
{{
  "title": "Article title",
  "sections": [{{ "heading": "Section heading", "points": ["point"] }}]
}}"#,
            keyword = keyword,
            summary = research.summary,
            points = bullet_list(&research.key_points),
            angles = bullet_list(&research.competitor_angles),
            faq_rule = faq_rule,
        )
    }

    pub fn parse_response(response: &str) -> AppResult<Outline> {
        let outline: Outline = extract_json(response)?;
        if outline.title.trim().is_empty() || outline.sections.is_empty() {
            return Err(AppError::LLMApi(
                "Outline must have a title and at least one section".to_string(),
            ));
        }
        Ok(outline)
    }

    /// Make the FAQ section match the job's flag regardless of what the
    /// model produced.
    pub fn apply_faq_policy(mut outline: Outline, include_faq: bool, questions: &[String]) -> Outline {
        if !include_faq {
            outline.sections.retain(|s| !is_faq_heading(&s.heading));
        } else if !outline.has_faq() && !questions.is_empty() {
            outline.sections.push(OutlineSection {
                heading: FAQ_HEADING.to_string(),
                points: questions.iter().take(MAX_FAQ_QUESTIONS).cloned().collect(),
            });
        }
        outline
    }
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- (none)".to_string();
    }
    items
        .iter()
        .map(|i| format!("- {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl StageAgent for OutlineAgent {
    fn stage(&self) -> Stage {
        Stage::Outline
    }

    async fn run(&self, input: StageInput<'_>) -> AppResult<StageOutput> {
        let research = require(input.context.research.as_ref(), Stage::Outline, "research")?;
        let job_input = &input.job.input;

        let prompt = Self::create_prompt(&job_input.keyword, research, job_input.include_faq);
        let response = self
            .llm
            .complete(
                "You are an experienced content strategist who structures articles for search.",
                &prompt,
                1200,
                0.4,
            )
            .await?;

        let outline = Self::apply_faq_policy(
            Self::parse_response(&response)?,
            job_input.include_faq,
            &research.questions,
        );
        info!(job_id = %input.job.id, sections = outline.sections.len(), "Outline complete");
        Ok(StageOutput::Outline(outline))
    }
}
