//! Errors produced by the HTTP phase and per-type parsers (spec.md §4.3).

use catchup_reliability::Retryable;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("URL rejected by safety gate: {0}")]
    Security(#[from] catchup_core::SecurityError),

    #[error("request error: {0}")]
    Request(#[source] reqwest::Error),

    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("response body exceeded the {max} byte cap")]
    BodyTooLarge { max: usize },

    #[error("missing scraper_config for source_type {0}")]
    MissingScraperConfig(catchup_core::SourceType),

    #[error("failed to parse feed: {0}")]
    Parse(String),

    #[error("adapter produced zero items")]
    EmptyResult,

    #[error("redirected more than {max} times")]
    TooManyRedirects { max: u8 },

    #[error("redirect response carried no (or an unparsable) Location header")]
    BadRedirect,
}

impl Retryable for FetchError {
    /// spec.md §4.2: retryable iff network error or HTTP ≥ 500.
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Request(_) => true,
            FetchError::Status { status } => *status >= 500,
            _ => false,
        }
    }
}

pub type FetchResult<T> = Result<T, FetchError>;
