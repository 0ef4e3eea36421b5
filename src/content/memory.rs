use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::store::{ArticleStore, KeywordStore, WebsiteStore};
use super::{Article, Keyword, KeywordStatus, WebsiteConfig};
use crate::types::{AppError, AppResult};

/// Seed file layout for the memory backend
#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    websites: Vec<WebsiteConfig>,
    #[serde(default)]
    keywords: Vec<SeedKeyword>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedKeyword {
    website_id: Uuid,
    text: String,
    #[serde(default)]
    priority: i32,
}

/// Keywords, websites and articles held in process memory.
#[derive(Default)]
pub struct InMemoryContentStore {
    websites: RwLock<HashMap<Uuid, WebsiteConfig>>,
    keywords: RwLock<HashMap<Uuid, Keyword>>,
    articles: RwLock<HashMap<Uuid, Article>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load websites and keywords from a JSON seed file
    pub async fn from_seed_file(path: &Path) -> AppResult<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Internal(format!("Failed to read seed file {:?}: {}", path, e))
        })?;
        let seed: SeedFile = serde_json::from_str(&raw)?;

        let store = Self::new();
        for website in seed.websites {
            store.insert_website(website).await;
        }
        for keyword in seed.keywords {
            if store.websites.read().await.get(&keyword.website_id).is_none() {
                return Err(AppError::InvalidRequest(format!(
                    "seed keyword '{}' references unknown website {}",
                    keyword.text, keyword.website_id
                )));
            }
            store
                .insert_keyword(Keyword::new(keyword.website_id, keyword.text, keyword.priority))
                .await;
        }

        info!(
            websites = store.websites.read().await.len(),
            keywords = store.keywords.read().await.len(),
            "Loaded content seed"
        );
        Ok(store)
    }

    pub async fn insert_website(&self, website: WebsiteConfig) {
        self.websites.write().await.insert(website.id, website);
    }

    pub async fn insert_keyword(&self, keyword: Keyword) {
        self.keywords.write().await.insert(keyword.id, keyword);
    }
}

#[async_trait]
impl KeywordStore for InMemoryContentStore {
    async fn get(&self, keyword_id: Uuid) -> AppResult<Option<Keyword>> {
        Ok(self.keywords.read().await.get(&keyword_id).cloned())
    }

    async fn next_pending(&self, website_id: Uuid) -> AppResult<Option<Keyword>> {
        let keywords = self.keywords.read().await;
        let best = keywords
            .values()
            .filter(|k| k.website_id == website_id && k.status == KeywordStatus::Pending)
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
            });
        Ok(best.cloned())
    }

    async fn set_status(&self, keyword_id: Uuid, status: KeywordStatus) -> AppResult<()> {
        let mut keywords = self.keywords.write().await;
        let keyword = keywords
            .get_mut(&keyword_id)
            .ok_or_else(|| AppError::NotFound(format!("keyword {}", keyword_id)))?;
        keyword.status = status;
        Ok(())
    }
}

#[async_trait]
impl WebsiteStore for InMemoryContentStore {
    async fn get(&self, website_id: Uuid) -> AppResult<Option<WebsiteConfig>> {
        Ok(self.websites.read().await.get(&website_id).cloned())
    }
}

#[async_trait]
impl ArticleStore for InMemoryContentStore {
    async fn save(&self, article: &Article) -> AppResult<Uuid> {
        self.articles
            .write()
            .await
            .insert(article.id, article.clone());
        Ok(article.id)
    }

    async fn get(&self, article_id: Uuid) -> AppResult<Option<Article>> {
        Ok(self.articles.read().await.get(&article_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_next_pending_prefers_priority_then_age() {
        let store = InMemoryContentStore::new();
        let site = WebsiteConfig::new("Acme");
        let site_id = site.id;
        store.insert_website(site).await;

        let low = Keyword::new(site_id, "low", 1);
        let mut high_old = Keyword::new(site_id, "high old", 5);
        high_old.created_at -= chrono::Duration::minutes(5);
        let high_new = Keyword::new(site_id, "high new", 5);
        let mut used = Keyword::new(site_id, "used", 10);
        used.status = KeywordStatus::Used;

        for k in [low, high_old.clone(), high_new, used] {
            store.insert_keyword(k).await;
        }

        let picked = store.next_pending(site_id).await.unwrap().unwrap();
        assert_eq!(picked.id, high_old.id);

        KeywordStore::set_status(&store, high_old.id, KeywordStatus::Generating)
            .await
            .unwrap();
        let picked = store.next_pending(site_id).await.unwrap().unwrap();
        assert_eq!(picked.text, "high new");

        assert!(store.next_pending(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_status_unknown_keyword() {
        let store = InMemoryContentStore::new();
        let err = store
            .set_status(Uuid::new_v4(), KeywordStatus::Used)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_from_seed_file() {
        let site_id = Uuid::new_v4();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            serde_json::json!({
                "websites": [{ "id": site_id, "name": "Acme", "brandVoice": "friendly" }],
                "keywords": [
                    { "websiteId": site_id, "text": "invoice templates", "priority": 3 },
                    { "websiteId": site_id, "text": "late fees" }
                ]
            })
        )
        .unwrap();

        let store = InMemoryContentStore::from_seed_file(file.path()).await.unwrap();
        let website = WebsiteStore::get(&store, site_id).await.unwrap().unwrap();
        assert_eq!(website.brand_voice.as_deref(), Some("friendly"));

        let next = store.next_pending(site_id).await.unwrap().unwrap();
        assert_eq!(next.text, "invoice templates");
    }

    #[tokio::test]
    async fn test_seed_rejects_orphan_keyword() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            serde_json::json!({
                "keywords": [{ "websiteId": Uuid::new_v4(), "text": "orphan" }]
            })
        )
        .unwrap();

        let result = InMemoryContentStore::from_seed_file(file.path()).await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }
}
