//! Fetcher Adapters (C3) and Content Enhancer (C4), spec.md §4.3–§4.4.

pub mod adapters;
pub mod content_enhancer;
pub mod error;
pub mod fetcher;
pub mod http_phase;

pub use adapters::build_fetcher;
pub use content_enhancer::{apply_policy, ContentEnhancer, EnhanceOutcome, HtmlContentEnhancer};
pub use error::{FetchError, FetchResult};
pub use fetcher::FeedFetcher;
pub use http_phase::HttpPhase;
