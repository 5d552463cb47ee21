use catchup_reliability::Retryable;

#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    #[error("summarizer call cancelled")]
    Cancelled,

    #[error("summarizer request failed: {0}")]
    Request(String),
}

impl Retryable for SummarizeError {
    fn is_retryable(&self) -> bool {
        matches!(self, SummarizeError::Request(_))
    }
}

pub type SummarizeResult<T> = Result<T, SummarizeError>;
