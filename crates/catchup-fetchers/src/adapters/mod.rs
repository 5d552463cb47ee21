pub mod nextjs;
pub mod remix;
pub mod rss;
pub mod webflow;

use std::sync::Arc;

use catchup_core::{SourceType, UrlGate};
use catchup_reliability::RetryConfig;

use crate::fetcher::FeedFetcher;
use crate::http_phase::HttpPhase;

/// Build the `FeedFetcher` for a source's `source_type` (spec.md §4.9
/// "selecting-fetcher": pick by `S.source_type`). Every adapter shares one
/// `UrlGate` + `reqwest::Client` pair and the pass's configured retry policy.
pub fn build_fetcher(
    source_type: SourceType,
    client: reqwest::Client,
    gate: UrlGate,
    retry: RetryConfig,
) -> Arc<dyn FeedFetcher> {
    let http = HttpPhase::new(client, gate).with_retry_config(retry);
    match source_type {
        SourceType::Rss => Arc::new(rss::RssFetcher::new(http)),
        SourceType::Webflow => Arc::new(webflow::WebflowFetcher::new(http)),
        SourceType::NextJs => Arc::new(nextjs::NextJsFetcher::new(http)),
        SourceType::Remix => Arc::new(remix::RemixFetcher::new(http)),
    }
}
