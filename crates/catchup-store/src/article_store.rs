//! Article store: the deduplication batch lookup (C5, spec.md §4.5) and
//! article persistence (spec.md §3).
//!
//! Unlike the teacher's `ArchiveStore::insert` (which swallows write errors
//! and logs a warning), article persistence here is fatal on error — spec.md
//! §4.9's per-item pipeline says "on store error → return fatal", since an
//! article that silently fails to persist would still get embedded/notified
//! under an id that doesn't exist.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use catchup_core::{Article, NewArticle};

use crate::error::StoreResult;

/// The Deduplicator + article persistence contract (C5, spec.md §4.5 and
/// §3). Trait so the crawl orchestrator's own tests can run against an
/// in-memory fake instead of a live Postgres (SPEC_FULL.md §13).
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// `exists_by_url_batch(urls) -> mapping<url, bool>`. A single round
    /// trip regardless of input size (spec.md §4.5).
    async fn exists_by_url_batch(&self, urls: &[String]) -> StoreResult<HashMap<String, bool>>;

    async fn insert(&self, new_article: NewArticle) -> StoreResult<Article>;

    /// Articles created on or after `since`, newest first. Backs the
    /// `summarize` AI CLI subcommand's period digest.
    async fn list_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Article>>;
}

#[derive(Clone)]
pub struct PgArticleStore {
    pool: PgPool,
}

impl PgArticleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArticleRepository for PgArticleStore {
    /// A single round trip (spec.md §4.5) via `= ANY($1)` over the full URL
    /// list; every input URL is present in the result, defaulting to
    /// `false` for URLs with no matching row.
    async fn exists_by_url_batch(&self, urls: &[String]) -> StoreResult<HashMap<String, bool>> {
        let mut result: HashMap<String, bool> =
            urls.iter().map(|u| (u.clone(), false)).collect();

        if urls.is_empty() {
            return Ok(result);
        }

        let existing: Vec<String> = sqlx::query_scalar("SELECT url FROM articles WHERE url = ANY($1)")
            .bind(urls)
            .fetch_all(&self.pool)
            .await?;

        for url in existing {
            result.insert(url, true);
        }

        Ok(result)
    }

    async fn insert(&self, new_article: NewArticle) -> StoreResult<Article> {
        let created_at = Utc::now();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO articles (source_id, title, url, summary, published_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(new_article.source_id)
        .bind(&new_article.title)
        .bind(&new_article.url)
        .bind(&new_article.summary)
        .bind(new_article.published_at)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(Article {
            id,
            source_id: new_article.source_id,
            title: new_article.title,
            url: new_article.url,
            summary: new_article.summary,
            published_at: new_article.published_at,
            created_at,
        })
    }

    async fn list_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, source_id, title, url, summary, published_at, created_at
            FROM articles
            WHERE created_at >= $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ArticleRow::into_article).collect())
    }
}

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: i64,
    source_id: i64,
    title: String,
    url: String,
    summary: String,
    published_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl ArticleRow {
    fn into_article(self) -> Article {
        Article {
            id: self.id,
            source_id: self.source_id,
            title: self.title,
            url: self.url,
            summary: self.summary,
            published_at: self.published_at,
            created_at: self.created_at,
        }
    }
}
