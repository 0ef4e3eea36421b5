//! Publish hook fired when a job completes with `autoPublish` set.
//!
//! Publishing is fire-and-forget from the pipeline's point of view: the
//! orchestrator spawns the call and only logs its outcome.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

use super::{Article, WebsiteConfig};
use crate::types::{AppError, AppResult};
use crate::utils::with_retry;

#[async_trait]
pub trait PublishHook: Send + Sync {
    async fn publish(&self, article: &Article, website: &WebsiteConfig) -> AppResult<()>;
}

/// Does nothing; used when no CMS integration is configured.
pub struct NoopPublisher;

#[async_trait]
impl PublishHook for NoopPublisher {
    async fn publish(&self, article: &Article, _website: &WebsiteConfig) -> AppResult<()> {
        info!(article_id = %article.id, "Publish requested but no publisher configured");
        Ok(())
    }
}

/// POSTs the article JSON to the website's configured webhook.
pub struct WebhookPublisher {
    client: Client,
    max_attempts: u32,
    base_delay: Duration,
}

impl WebhookPublisher {
    pub fn new() -> Self {
        Self::with_policy(3, Duration::from_secs(2))
    }

    pub fn with_policy(max_attempts: u32, base_delay: Duration) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_attempts,
            base_delay,
        }
    }

    async fn post_once(&self, url: &str, article: &Article) -> AppResult<()> {
        let payload = serde_json::json!({
            "event": "article.completed",
            "article": article,
        });
        self.client
            .post(url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl Default for WebhookPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PublishHook for WebhookPublisher {
    async fn publish(&self, article: &Article, website: &WebsiteConfig) -> AppResult<()> {
        let Some(url) = website.publish_webhook.as_deref() else {
            warn!(website_id = %website.id, "Auto-publish requested but website has no webhook");
            return Ok(());
        };

        with_retry(
            || self.post_once(url, article),
            self.max_attempts,
            self.base_delay,
        )
        .await
        .map_err(|e| AppError::Internal(format!("Publishing to {} failed: {}", url, e)))?;

        info!(article_id = %article.id, url, "Article published");
        Ok(())
    }
}
