//! The `FeedFetcher` contract (spec.md §4.3).

use async_trait::async_trait;
use catchup_core::{FeedItem, ScraperConfig};
use catchup_reliability::CircuitBreaker;
use tokio_util::sync::CancellationToken;

use crate::error::FetchResult;

/// Per-source-type implementation of the feed-fetch contract. The adapter
/// receives its `ScraperConfig` by lookup on the context; absence of a
/// required config is an immediate error (spec.md §4.3).
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        scraper_config: Option<&ScraperConfig>,
        breaker: &CircuitBreaker,
        cancel: &CancellationToken,
    ) -> FetchResult<Vec<FeedItem>>;

    fn name(&self) -> &str;
}
