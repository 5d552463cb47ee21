//! Source store: lists active crawl targets and records `last_crawled_at`
//! (spec.md §3: "read-only to the crawler except for atomic updates to
//! last-crawled-at after a successful pass").

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use catchup_core::{ScraperConfig, Source, SourceType};

use crate::error::{StoreError, StoreResult};

/// Source listing + `last_crawled_at` bookkeeping (spec.md §3: "read-only to
/// the crawler except for atomic updates to last-crawled-at after a
/// successful pass"). Trait so the orchestrator's tests can run against an
/// in-memory fake (SPEC_FULL.md §13).
#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// All sources with `active = true`, ordered by id for deterministic
    /// pass-over-pass iteration order.
    async fn list_active(&self) -> StoreResult<Vec<Source>>;

    /// Records a successful pass (spec.md §4.9 `finalizing`).
    async fn mark_crawled(&self, source_id: i64, at: DateTime<Utc>) -> StoreResult<()>;
}

#[derive(Debug, sqlx::FromRow)]
struct SourceRow {
    id: i64,
    name: String,
    feed_url: String,
    active: bool,
    last_crawled_at: Option<DateTime<Utc>>,
    source_type: String,
    scraper_config: Option<serde_json::Value>,
}

fn parse_source_type(raw: &str, source_id: i64) -> SourceType {
    let parsed = raw.parse::<SourceType>().unwrap_or_default();
    let recognized = matches!(
        raw.trim().to_lowercase().as_str(),
        "" | "rss" | "webflow" | "nextjs" | "next.js" | "next_js" | "remix"
    );
    if !recognized {
        tracing::warn!(source_id, raw_source_type = raw, "unrecognized source_type, falling back to rss");
    }
    parsed
}

impl SourceRow {
    fn into_source(self) -> StoreResult<Source> {
        let scraper_config = self
            .scraper_config
            .map(|v| serde_json::from_value::<ScraperConfig>(v))
            .transpose()
            .map_err(StoreError::InvalidScraperConfig)?;

        Ok(Source {
            id: self.id,
            name: self.name,
            feed_url: self.feed_url,
            active: self.active,
            last_crawled_at: self.last_crawled_at,
            source_type: parse_source_type(&self.source_type, self.id),
            scraper_config,
        })
    }
}

#[derive(Clone)]
pub struct PgSourceStore {
    pool: PgPool,
}

impl PgSourceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceRepository for PgSourceStore {
    async fn list_active(&self) -> StoreResult<Vec<Source>> {
        let rows = sqlx::query_as::<_, SourceRow>(
            r#"
            SELECT id, name, feed_url, active, last_crawled_at, source_type, scraper_config
            FROM sources
            WHERE active
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SourceRow::into_source).collect()
    }

    async fn mark_crawled(&self, source_id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE sources SET last_crawled_at = $1 WHERE id = $2")
            .bind(at)
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
