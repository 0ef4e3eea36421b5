//! Image Agent
//!
//! Generates the featured image. The executor skips this stage entirely when
//! the job was enqueued with `includeImages: false`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::content::FeaturedImage;
use crate::llm::ImageGenerator;
use crate::pipeline::{StageAgent, StageInput, StageOutput};
use crate::queue::Stage;
use crate::types::AppResult;

pub struct ImageAgent {
    generator: Arc<dyn ImageGenerator>,
}

impl ImageAgent {
    pub fn new(generator: Arc<dyn ImageGenerator>) -> Self {
        Self { generator }
    }

    fn create_prompt(title: &str, keyword: &str) -> String {
        format!(
            "A clean, modern editorial illustration for a blog article titled \"{}\" about {}. \
             No text, no logos, soft natural lighting, wide 16:9 composition.",
            title, keyword
        )
    }
}

#[async_trait]
impl StageAgent for ImageAgent {
    fn stage(&self) -> Stage {
        Stage::Image
    }

    async fn run(&self, input: StageInput<'_>) -> AppResult<StageOutput> {
        let keyword = &input.job.input.keyword;
        let title = input
            .context
            .metadata
            .as_ref()
            .map(|m| m.title.as_str())
            .unwrap_or(keyword.as_str());

        let image = self
            .generator
            .generate(&Self::create_prompt(title, keyword))
            .await?;

        info!(job_id = %input.job.id, url = %image.url, "Featured image generated");
        Ok(StageOutput::Image(FeaturedImage {
            url: image.url,
            alt: title.to_string(),
        }))
    }
}
