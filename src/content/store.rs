use async_trait::async_trait;
use uuid::Uuid;

use super::{Article, Keyword, KeywordStatus, WebsiteConfig};
use crate::types::AppResult;

#[async_trait]
pub trait KeywordStore: Send + Sync {
    async fn get(&self, keyword_id: Uuid) -> AppResult<Option<Keyword>>;

    /// Highest-priority `PENDING` keyword of the website, oldest first on ties.
    async fn next_pending(&self, website_id: Uuid) -> AppResult<Option<Keyword>>;

    async fn set_status(&self, keyword_id: Uuid, status: KeywordStatus) -> AppResult<()>;
}

/// Read-only access to per-website generation settings.
#[async_trait]
pub trait WebsiteStore: Send + Sync {
    async fn get(&self, website_id: Uuid) -> AppResult<Option<WebsiteConfig>>;
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn save(&self, article: &Article) -> AppResult<Uuid>;

    async fn get(&self, article_id: Uuid) -> AppResult<Option<Article>>;
}
