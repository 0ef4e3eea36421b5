//! Content entities the pipeline reads and writes but does not own:
//! keywords, website configuration, finished articles, and the publish hook.

pub mod memory;
pub mod publish;
pub mod store;

pub use memory::InMemoryContentStore;
pub use publish::{NoopPublisher, PublishHook, WebhookPublisher};
pub use store::{ArticleStore, KeywordStore, WebsiteStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::queue::ContentLength;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeywordStatus {
    Pending,
    Generating,
    Used,
}

impl KeywordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            KeywordStatus::Pending => "pending",
            KeywordStatus::Generating => "generating",
            KeywordStatus::Used => "used",
        }
    }

    pub fn parse(value: &str) -> Option<KeywordStatus> {
        match value {
            "pending" => Some(KeywordStatus::Pending),
            "generating" => Some(KeywordStatus::Generating),
            "used" => Some(KeywordStatus::Used),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyword {
    pub id: Uuid,
    pub website_id: Uuid,
    pub text: String,
    /// Higher is picked first
    pub priority: i32,
    pub status: KeywordStatus,
    pub created_at: DateTime<Utc>,
}

impl Keyword {
    pub fn new(website_id: Uuid, text: impl Into<String>, priority: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            website_id,
            text: text.into(),
            priority,
            status: KeywordStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// Word-count targets per requested length tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentLengths {
    pub short: u32,
    pub medium: u32,
    pub long: u32,
}

impl Default for ContentLengths {
    fn default() -> Self {
        Self {
            short: 800,
            medium: 1500,
            long: 2500,
        }
    }
}

impl ContentLengths {
    pub fn word_target(&self, length: ContentLength) -> u32 {
        match length {
            ContentLength::Short => self.short,
            ContentLength::Medium => self.medium,
            ContentLength::Long => self.long,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalLink {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteConfig {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub brand_voice: Option<String>,
    #[serde(default)]
    pub target_audience: Option<String>,
    #[serde(default)]
    pub content_lengths: ContentLengths,
    #[serde(default)]
    pub internal_links: Vec<InternalLink>,
    #[serde(default)]
    pub publish_webhook: Option<String>,
}

impl WebsiteConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            brand_voice: None,
            target_audience: None,
            content_lengths: ContentLengths::default(),
            internal_links: Vec::new(),
            publish_webhook: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialCaptions {
    pub twitter: String,
    pub facebook: String,
    pub linkedin: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturedImage {
    pub url: String,
    pub alt: String,
}

/// A finished, SEO-scored article produced by a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: Uuid,
    pub website_id: Uuid,
    pub keyword_id: Option<Uuid>,
    pub job_id: Uuid,
    pub title: String,
    pub slug: String,
    /// Markdown body
    pub content: String,
    pub meta_title: String,
    pub meta_description: String,
    pub social: SocialCaptions,
    pub tags: Vec<String>,
    pub seo_score: u8,
    pub word_count: u32,
    pub featured_image: Option<FeaturedImage>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_targets() {
        let lengths = ContentLengths::default();
        assert_eq!(lengths.word_target(ContentLength::Short), 800);
        assert_eq!(lengths.word_target(ContentLength::Medium), 1500);
        assert_eq!(lengths.word_target(ContentLength::Long), 2500);
    }

    #[test]
    fn test_website_config_defaults_from_json() {
        let id = Uuid::new_v4();
        let config: WebsiteConfig = serde_json::from_value(serde_json::json!({
            "id": id,
            "name": "Acme Invoicing",
            "internalLinks": [{ "url": "/pricing", "title": "pricing" }]
        }))
        .unwrap();
        assert_eq!(config.id, id);
        assert_eq!(config.brand_voice, None);
        assert_eq!(config.content_lengths, ContentLengths::default());
        assert_eq!(config.internal_links.len(), 1);
    }

    #[test]
    fn test_keyword_status_round_trip_names() {
        for status in [
            KeywordStatus::Pending,
            KeywordStatus::Generating,
            KeywordStatus::Used,
        ] {
            assert_eq!(KeywordStatus::parse(status.as_str()), Some(status));
        }
    }
}
