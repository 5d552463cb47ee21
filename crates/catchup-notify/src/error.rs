use catchup_reliability::Retryable;

/// spec.md §4.8: on HTTP 429 the caller handles retry-after specially, on
/// 5xx retry, on other 4xx do not retry.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("request error: {0}")]
    Request(String),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: std::time::Duration },

    #[error("HTTP {status}")]
    Status { status: u16 },
}

impl Retryable for NotifyError {
    fn is_retryable(&self) -> bool {
        match self {
            NotifyError::Request(_) => true,
            NotifyError::RateLimited { .. } => true,
            NotifyError::Status { status } => *status >= 500,
        }
    }
}

pub type NotifyResult<T> = Result<T, NotifyError>;
