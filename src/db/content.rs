use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::content::{
    Article, ArticleStore, ContentLengths, FeaturedImage, InternalLink, Keyword, KeywordStatus,
    KeywordStore, SocialCaptions, WebsiteConfig, WebsiteStore,
};
use crate::types::{AppError, AppResult};

#[derive(Debug, FromRow)]
struct KeywordRow {
    id: Uuid,
    website_id: Uuid,
    text: String,
    priority: i32,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<KeywordRow> for Keyword {
    type Error = AppError;

    fn try_from(row: KeywordRow) -> AppResult<Self> {
        let status = KeywordStatus::parse(&row.status).ok_or_else(|| {
            AppError::Internal(format!("unknown keyword status '{}'", row.status))
        })?;
        Ok(Keyword {
            id: row.id,
            website_id: row.website_id,
            text: row.text,
            priority: row.priority,
            status,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct WebsiteRow {
    id: Uuid,
    name: String,
    brand_voice: Option<String>,
    target_audience: Option<String>,
    content_lengths: Json<ContentLengths>,
    internal_links: Json<Vec<InternalLink>>,
    publish_webhook: Option<String>,
}

impl From<WebsiteRow> for WebsiteConfig {
    fn from(row: WebsiteRow) -> Self {
        WebsiteConfig {
            id: row.id,
            name: row.name,
            brand_voice: row.brand_voice,
            target_audience: row.target_audience,
            content_lengths: row.content_lengths.0,
            internal_links: row.internal_links.0,
            publish_webhook: row.publish_webhook,
        }
    }
}

#[derive(Debug, FromRow)]
struct ArticleRow {
    id: Uuid,
    website_id: Uuid,
    keyword_id: Option<Uuid>,
    job_id: Uuid,
    title: String,
    slug: String,
    content: String,
    meta_title: String,
    meta_description: String,
    social: Json<SocialCaptions>,
    tags: Vec<String>,
    seo_score: i16,
    word_count: i32,
    featured_image: Option<Json<FeaturedImage>>,
    created_at: DateTime<Utc>,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Article {
            id: row.id,
            website_id: row.website_id,
            keyword_id: row.keyword_id,
            job_id: row.job_id,
            title: row.title,
            slug: row.slug,
            content: row.content,
            meta_title: row.meta_title,
            meta_description: row.meta_description,
            social: row.social.0,
            tags: row.tags,
            seo_score: row.seo_score.clamp(0, 100) as u8,
            word_count: row.word_count.max(0) as u32,
            featured_image: row.featured_image.map(|j| j.0),
            created_at: row.created_at,
        }
    }
}

/// Keywords, websites and articles in Postgres.
pub struct PgContentStore {
    pool: PgPool,
}

impl PgContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeywordStore for PgContentStore {
    async fn get(&self, keyword_id: Uuid) -> AppResult<Option<Keyword>> {
        let row = sqlx::query_as::<_, KeywordRow>(
            "SELECT id, website_id, text, priority, status, created_at FROM keywords WHERE id = $1",
        )
        .bind(keyword_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Keyword::try_from).transpose()
    }

    async fn next_pending(&self, website_id: Uuid) -> AppResult<Option<Keyword>> {
        let row = sqlx::query_as::<_, KeywordRow>(
            r#"
            SELECT id, website_id, text, priority, status, created_at
            FROM keywords
            WHERE website_id = $1 AND status = 'pending'
            ORDER BY priority DESC, created_at
            LIMIT 1
            "#,
        )
        .bind(website_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Keyword::try_from).transpose()
    }

    async fn set_status(&self, keyword_id: Uuid, status: KeywordStatus) -> AppResult<()> {
        let result = sqlx::query("UPDATE keywords SET status = $2 WHERE id = $1")
            .bind(keyword_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("keyword {}", keyword_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl WebsiteStore for PgContentStore {
    async fn get(&self, website_id: Uuid) -> AppResult<Option<WebsiteConfig>> {
        let row = sqlx::query_as::<_, WebsiteRow>(
            r#"
            SELECT id, name, brand_voice, target_audience, content_lengths, internal_links, publish_webhook
            FROM websites
            WHERE id = $1
            "#,
        )
        .bind(website_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(WebsiteConfig::from))
    }
}

#[async_trait]
impl ArticleStore for PgContentStore {
    async fn save(&self, article: &Article) -> AppResult<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO articles
                (id, website_id, keyword_id, job_id, title, slug, content, meta_title,
                 meta_description, social, tags, seo_score, word_count, featured_image, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING id
            "#,
        )
        .bind(article.id)
        .bind(article.website_id)
        .bind(article.keyword_id)
        .bind(article.job_id)
        .bind(&article.title)
        .bind(&article.slug)
        .bind(&article.content)
        .bind(&article.meta_title)
        .bind(&article.meta_description)
        .bind(Json(&article.social))
        .bind(&article.tags)
        .bind(article.seo_score as i16)
        .bind(article.word_count as i32)
        .bind(article.featured_image.as_ref().map(Json))
        .bind(article.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get(&self, article_id: Uuid) -> AppResult<Option<Article>> {
        let row = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, website_id, keyword_id, job_id, title, slug, content, meta_title,
                   meta_description, social, tags, seo_score, word_count, featured_image, created_at
            FROM articles
            WHERE id = $1
            "#,
        )
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Article::from))
    }
}
