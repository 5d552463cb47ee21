//! RSS/Atom adapter (spec.md §4.3): delegate to a standard feed parser; map
//! each item using the richer "content" field when present, else
//! "description".

use async_trait::async_trait;
use catchup_core::{FeedItem, ScraperConfig};
use catchup_reliability::CircuitBreaker;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, FetchResult};
use crate::fetcher::FeedFetcher;
use crate::http_phase::HttpPhase;

pub struct RssFetcher {
    http: HttpPhase,
}

impl RssFetcher {
    pub fn new(http: HttpPhase) -> Self {
        Self { http }
    }
}

#[async_trait]
impl FeedFetcher for RssFetcher {
    async fn fetch(
        &self,
        url: &str,
        _scraper_config: Option<&ScraperConfig>,
        breaker: &CircuitBreaker,
        cancel: &CancellationToken,
    ) -> FetchResult<Vec<FeedItem>> {
        let body = self.http.fetch(url, breaker, cancel).await?;
        let feed = feed_rs::parser::parse(body.as_bytes())
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        let items: Vec<FeedItem> = feed
            .entries
            .into_iter()
            .filter_map(|entry| {
                let item_url = entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))?;

                let title = entry.title.map(|t| t.content).unwrap_or_default();
                let content = entry
                    .content
                    .and_then(|c| c.body)
                    .or_else(|| entry.summary.map(|s| s.content))
                    .unwrap_or_default();
                let published_at = entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                    .unwrap_or_else(chrono::Utc::now);

                Some(FeedItem {
                    title,
                    url: item_url,
                    content,
                    published_at,
                })
            })
            .collect();

        if items.is_empty() {
            return Err(FetchError::EmptyResult);
        }
        Ok(items)
    }

    fn name(&self) -> &str {
        "rss"
    }
}
