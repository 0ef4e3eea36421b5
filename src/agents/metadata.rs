//! Metadata Agent
//!
//! Derives the title tag, meta description, social captions and tags. When
//! the model reply cannot be used the agent falls back to values built from
//! the outline so a good article is never failed over its metadata.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agents::{extract_json, require, slugify, truncate_chars};
use crate::content::SocialCaptions;
use crate::llm::LLM;
use crate::pipeline::{StageAgent, StageInput, StageOutput};
use crate::queue::Stage;
use crate::types::AppResult;

pub const META_TITLE_MAX: usize = 60;
pub const META_DESCRIPTION_MAX: usize = 160;
const MAX_TAGS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleMetadata {
    pub title: String,
    pub slug: String,
    pub meta_title: String,
    pub meta_description: String,
    pub social: SocialCaptions,
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MetadataReply {
    #[serde(default)]
    meta_title: String,
    #[serde(default)]
    meta_description: String,
    #[serde(default)]
    social: SocialCaptions,
    #[serde(default)]
    tags: Vec<String>,
}

pub struct MetadataAgent {
    llm: LLM,
}

impl MetadataAgent {
    pub fn new(llm: LLM) -> Self {
        Self { llm }
    }

    fn create_prompt(title: &str, keyword: &str, body: &str) -> String {
        let excerpt: String = body.chars().take(3000).collect();
        format!(
            r#"Write search and social metadata for this article.

TITLE: {title}
KEYWORD: {keyword}

ARTICLE (excerpt):
{excerpt}

RULES:
- meta_title: at most {title_max} characters, contains the keyword
- meta_description: at most {desc_max} characters, contains the keyword, ends with a call to action
- social: one caption each for twitter, facebook and linkedin
- tags: 3 to {max_tags} short lowercase topic tags

OUTPUT FORMAT (respond with ONLY valid JSON):
{{
  "meta_title": "...",
  "meta_description": "...",
  "social": {{ "twitter": "...", "facebook": "...", "linkedin": "..." }},
  "tags": ["..."]
}}"#,
            title = title,
            keyword = keyword,
            excerpt = excerpt,
            title_max = META_TITLE_MAX,
            desc_max = META_DESCRIPTION_MAX,
            max_tags = MAX_TAGS,
        )
    }

    /// Metadata built without the model, from the title and body.
    pub fn fallback(title: &str, keyword: &str, body: &str) -> ArticleMetadata {
        let first_paragraph = body
            .split("\n\n")
            .map(str::trim)
            .find(|p| !p.is_empty() && !p.starts_with('#'))
            .unwrap_or(title);

        Self::finalize(
            title,
            keyword,
            MetadataReply {
                meta_title: title.to_string(),
                meta_description: first_paragraph.replace('\n', " "),
                social: SocialCaptions {
                    twitter: title.to_string(),
                    facebook: title.to_string(),
                    linkedin: title.to_string(),
                },
                tags: Vec::new(),
            },
        )
    }

    /// Apply length limits and tag rules to whatever the model returned.
    fn finalize(title: &str, keyword: &str, reply: MetadataReply) -> ArticleMetadata {
        let meta_title = if reply.meta_title.trim().is_empty() {
            title
        } else {
            reply.meta_title.trim()
        };

        let mut tags: Vec<String> = Vec::new();
        let keyword_tag = keyword.trim().to_lowercase();
        for tag in std::iter::once(keyword_tag).chain(reply.tags) {
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() && !tags.contains(&tag) && tags.len() < MAX_TAGS {
                tags.push(tag);
            }
        }

        ArticleMetadata {
            title: title.to_string(),
            slug: slugify(title),
            meta_title: truncate_chars(meta_title, META_TITLE_MAX),
            meta_description: truncate_chars(&reply.meta_description, META_DESCRIPTION_MAX),
            social: reply.social,
            tags,
        }
    }
}

/// The article title: the body's H1, else the outline title, else the keyword.
fn article_title(body: &str, outline_title: Option<&str>, keyword: &str) -> String {
    body.lines()
        .find_map(|l| l.strip_prefix("# "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or(outline_title)
        .unwrap_or(keyword)
        .to_string()
}

#[async_trait]
impl StageAgent for MetadataAgent {
    fn stage(&self) -> Stage {
        Stage::Metadata
    }

    async fn run(&self, input: StageInput<'_>) -> AppResult<StageOutput> {
        let seo = require(input.context.seo.as_ref(), Stage::Metadata, "the seo pass")?;
        let keyword = &input.job.input.keyword;
        let title = article_title(
            &seo.content,
            input.context.outline.as_ref().map(|o| o.title.as_str()),
            keyword,
        );

        let prompt = Self::create_prompt(&title, keyword, &seo.content);
        let reply = self
            .llm
            .complete(
                "You are an SEO specialist writing concise, accurate metadata.",
                &prompt,
                600,
                0.4,
            )
            .await?;

        let metadata = match extract_json::<MetadataReply>(&reply) {
            Ok(parsed) if !parsed.meta_description.trim().is_empty() => {
                Self::finalize(&title, keyword, parsed)
            }
            Ok(_) | Err(_) => {
                warn!(job_id = %input.job.id, "Unusable metadata reply, using fallback");
                Self::fallback(&title, keyword, &seo.content)
            }
        };

        info!(job_id = %input.job.id, slug = %metadata.slug, tags = metadata.tags.len(), "Metadata complete");
        Ok(StageOutput::Metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::SeoAgent;
    use crate::content::WebsiteConfig;
    use crate::llm::testing::scripted_llm;
    use crate::pipeline::PipelineContext;
    use crate::queue::{GenerationJob, JobInput, NewJob};

    const BODY: &str = "# Invoice Templates for Freelancers\n\nInvoice templates make billing painless.\n\n## Basics\nText.";

    fn job() -> GenerationJob {
        GenerationJob::new(NewJob {
            website_id: uuid::Uuid::new_v4(),
            keyword_id: None,
            input: JobInput::new("Invoice Templates"),
            retry_of: None,
        })
    }

    fn context() -> PipelineContext {
        PipelineContext {
            seo: Some(SeoAgent::optimize(BODY, "invoice templates", "x", &[])),
            ..Default::default()
        }
    }

    async fn run_with(reply: &str) -> ArticleMetadata {
        let (llm, _) = scripted_llm(&[reply]);
        let website = WebsiteConfig::new("Acme");
        let (job, ctx) = (job(), context());
        match MetadataAgent::new(llm)
            .run(StageInput {
                job: &job,
                website: &website,
                context: &ctx,
            })
            .await
            .unwrap()
        {
            StageOutput::Metadata(m) => m,
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_model_metadata_is_clamped() {
        let long_description = "word ".repeat(60);
        let reply = serde_json::json!({
            "meta_title": "Invoice Templates: Every Format Freelancers Need To Bill Clients Faster",
            "meta_description": long_description,
            "social": { "twitter": "t", "facebook": "f", "linkedin": "l" },
            "tags": ["Billing", "invoice templates", "billing", "freelance"]
        })
        .to_string();

        let metadata = run_with(&reply).await;
        assert_eq!(metadata.title, "Invoice Templates for Freelancers");
        assert_eq!(metadata.slug, "invoice-templates-for-freelancers");
        assert!(metadata.meta_title.chars().count() <= META_TITLE_MAX);
        assert!(metadata.meta_description.chars().count() <= META_DESCRIPTION_MAX);
        assert_eq!(metadata.tags, vec!["invoice templates", "billing", "freelance"]);
        assert_eq!(metadata.social.linkedin, "l");
    }

    #[tokio::test]
    async fn test_unusable_reply_falls_back() {
        let metadata = run_with("I cannot help with that.").await;
        assert_eq!(metadata.meta_title, "Invoice Templates for Freelancers");
        assert_eq!(
            metadata.meta_description,
            "Invoice templates make billing painless."
        );
        assert_eq!(metadata.tags, vec!["invoice templates"]);
    }

    #[test]
    fn test_article_title_sources() {
        assert_eq!(article_title("# From Body\ntext", Some("Outline"), "kw"), "From Body");
        assert_eq!(article_title("text", Some("Outline"), "kw"), "Outline");
        assert_eq!(article_title("text", None, "kw"), "kw");
    }
}
