// Featured image generation

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::llm::openai::OPENAI_API_BASE;
use crate::llm::provider::error_from_response;
use crate::types::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub url: String,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> AppResult<GeneratedImage>;
}

pub struct OpenAIImageGenerator {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    #[serde(default)]
    url: Option<String>,
}

impl OpenAIImageGenerator {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_api_base(api_key, model, OPENAI_API_BASE)
    }

    pub fn with_api_base(api_key: &str, model: &str, api_base: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl ImageGenerator for OpenAIImageGenerator {
    async fn generate(&self, prompt: &str) -> AppResult<GeneratedImage> {
        let response = self
            .client
            .post(format!("{}/images/generations", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&ImageRequest {
                model: &self.model,
                prompt,
                n: 1,
                size: "1792x1024",
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response("OpenAI Images", response).await);
        }

        let parsed: ImageResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLMApi(format!("Failed to parse image response: {}", e)))?;

        parsed
            .data
            .into_iter()
            .find_map(|d| d.url)
            .map(|url| GeneratedImage { url })
            .ok_or_else(|| AppError::LLMApi("Image provider returned no URL".to_string()))
    }
}
