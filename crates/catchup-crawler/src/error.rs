/// Propagates up through a crawl pass when the top-level context is
/// cancelled (spec.md §4.9: "cancellation ... cause the summarizer's
/// cancellation error to propagate upward as 'fatal'").
#[derive(Debug, thiserror::Error)]
pub enum CrawlFatal {
    #[error("crawl cancelled")]
    Cancelled,

    #[error("store error: {0}")]
    Store(#[from] catchup_store::StoreError),
}
