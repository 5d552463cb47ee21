//! Shared entities for the crawl pipeline: sources, scraper configuration,
//! parsed feed items, persisted articles, embeddings, and per-pass stats.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which fetcher adapter a [`Source`] uses. Empty/unknown source-type tags
/// fall back to RSS for backward compatibility (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Rss,
    Webflow,
    NextJs,
    Remix,
}

impl Default for SourceType {
    fn default() -> Self {
        SourceType::Rss
    }
}

impl std::str::FromStr for SourceType {
    type Err = std::convert::Infallible;

    /// Unknown or empty tags fall back to RSS rather than erroring — the
    /// orchestrator logs a warning when this happens (spec.md §4.9).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "webflow" => SourceType::Webflow,
            "nextjs" | "next.js" | "next_js" => SourceType::NextJs,
            "remix" => SourceType::Remix,
            _ => SourceType::Rss,
        })
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Rss => write!(f, "rss"),
            SourceType::Webflow => write!(f, "webflow"),
            SourceType::NextJs => write!(f, "nextjs"),
            SourceType::Remix => write!(f, "remix"),
        }
    }
}

/// Per-source fetcher parameters. A variant-shaped bag of optional fields;
/// which subset is required depends on `SourceType` (spec.md §3). Non-RSS
/// source types require this to be present — enforced by [`Source::validate`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ScraperConfig {
    // Webflow-HTML
    pub item_selector: Option<String>,
    pub title_selector: Option<String>,
    pub date_selector: Option<String>,
    pub url_selector: Option<String>,
    pub date_format: Option<String>,

    // NextJS
    pub data_key: Option<String>,

    // Remix
    pub context_key: Option<String>,

    // Shared by Webflow/NextJS/Remix
    pub url_prefix: Option<String>,
}

impl ScraperConfig {
    /// True if the fields required by Webflow are all present.
    pub fn has_webflow_fields(&self) -> bool {
        self.item_selector.is_some()
            && self.title_selector.is_some()
            && self.date_selector.is_some()
            && self.url_selector.is_some()
    }
}

/// A crawl target (spec.md §3). Read-only to the crawler except for the
/// atomic `last_crawled_at` update recorded after a successful pass.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub feed_url: String,
    pub active: bool,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub source_type: SourceType,
    pub scraper_config: Option<ScraperConfig>,
}

/// Errors a [`Source`] can fail admin-side validation with.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SourceValidationError {
    #[error("source_type {0} requires a scraper_config")]
    MissingScraperConfig(SourceType),
}

impl Source {
    /// spec.md §8: "∀ source S with source_type ≠ RSS: if scraper_config = ∅
    /// then validate(S) fails."
    pub fn validate(&self) -> Result<(), SourceValidationError> {
        if self.source_type != SourceType::Rss && self.scraper_config.is_none() {
            return Err(SourceValidationError::MissingScraperConfig(
                self.source_type,
            ));
        }
        Ok(())
    }
}

/// A parsed candidate article produced by a fetcher adapter. Not persisted
/// directly — becomes an [`Article`] only after dedup + summarize succeed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub url: String,
    pub content: String,
    pub published_at: DateTime<Utc>,
}

/// A persisted story (spec.md §3). `url` is the deduplication key and is
/// unique across the store. `summary` is the AI output, never the raw body.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Article {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    pub url: String,
    pub summary: String,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Fields required to insert a new article. `id`/`created_at` are assigned
/// by the store.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub source_id: i64,
    pub title: String,
    pub url: String,
    pub summary: String,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingType {
    Title,
    Content,
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    Openai,
    Voyage,
}

/// A vector attached to an article (spec.md §3). Produced out-of-band by an
/// external AI service invoked via the embedding hook (C7); the core only
/// fires the request and observes pending/success/failure counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleEmbedding {
    pub article_id: i64,
    pub embedding_type: EmbeddingType,
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimension: usize,
    pub vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ArticleEmbeddingError {
    #[error("dimension {declared} does not match vector length {actual}")]
    DimensionMismatch { declared: usize, actual: usize },
}

impl ArticleEmbedding {
    pub fn validate(&self) -> Result<(), ArticleEmbeddingError> {
        if self.dimension != self.vector.len() {
            return Err(ArticleEmbeddingError::DimensionMismatch {
                declared: self.dimension,
                actual: self.vector.len(),
            });
        }
        Ok(())
    }
}

/// Per-pass summary returned by the crawl orchestrator (spec.md §3).
/// Counters are incremented with atomic operations during a pass; this
/// value is produced once at the end (by merging per-worker accumulators),
/// never updated in place while exposed to a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlStats {
    pub sources: u64,
    pub feed_items: u64,
    pub inserted: u64,
    pub duplicated: u64,
    pub summarize_error: u64,
    pub content_fetch_skipped: u64,
    pub content_fetch_success: u64,
    pub content_fetch_failed: u64,
    pub duration: std::time::Duration,
}

impl std::fmt::Display for CrawlStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Crawl Pass Complete ===")?;
        writeln!(f, "Sources:           {}", self.sources)?;
        writeln!(f, "Feed items:        {}", self.feed_items)?;
        writeln!(f, "Inserted:          {}", self.inserted)?;
        writeln!(f, "Duplicated:        {}", self.duplicated)?;
        writeln!(f, "Summarize errors:  {}", self.summarize_error)?;
        writeln!(
            f,
            "Content enhance:   skipped={} success={} failed={}",
            self.content_fetch_skipped, self.content_fetch_success, self.content_fetch_failed
        )?;
        write!(f, "Duration:          {:.2?}", self.duration)
    }
}
