//! Summarizer Client (C6, spec.md §4.6). Binds the `Summarizer` contract to
//! the HTTP-based `ai-client` crate (the wire-level gRPC client is out of
//! scope — spec.md §1).

use std::time::Duration;

use ai_client::openai::OpenAi;
use ai_client::traits::{Agent, PromptBuilder};
use async_trait::async_trait;
use catchup_reliability::{retry_with_breaker, CircuitBreaker, RetryConfig, RetryOutcome};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{SummarizeError, SummarizeResult};

const DEFAULT_PREAMBLE: &str =
    "Summarize the following article in 2-3 concise sentences for a news digest reader.";

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> SummarizeResult<String>;
}

pub struct AiClientSummarizer {
    client: OpenAi,
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl AiClientSummarizer {
    pub fn new(client: OpenAi, breaker: CircuitBreaker, timeout: Duration) -> Self {
        Self {
            client,
            breaker,
            timeout,
        }
    }

    async fn call_once(&self, text: &str) -> SummarizeResult<String> {
        let response = tokio::time::timeout(
            self.timeout,
            self.client
                .prompt(text)
                .preamble(DEFAULT_PREAMBLE)
                .send(),
        )
        .await
        .map_err(|_| SummarizeError::Request("timed out".to_string()))?;

        response.map_err(|e| SummarizeError::Request(e.to_string()))
    }
}

#[async_trait]
impl Summarizer for AiClientSummarizer {
    /// spec.md §4.6: cancellation/deadline is crawl-fatal and propagates;
    /// any other error is recorded and the item skipped — callers
    /// distinguish the two by matching on `SummarizeError::Cancelled`.
    async fn summarize(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> SummarizeResult<String> {
        if cancel.is_cancelled() {
            return Err(SummarizeError::Cancelled);
        }

        let start = std::time::Instant::now();
        let outcome = retry_with_breaker(
            "summarize",
            RetryConfig::feed_fetch(),
            &self.breaker,
            cancel,
            || self.call_once(text),
        )
        .await;
        let elapsed = start.elapsed();

        match outcome {
            RetryOutcome::Ok(summary) => {
                tracing::debug!(duration_ms = elapsed.as_millis() as u64, "summarize succeeded");
                Ok(summary)
            }
            RetryOutcome::Cancelled => Err(SummarizeError::Cancelled),
            RetryOutcome::CircuitOpen => {
                warn!("summarizer circuit open, skipping item");
                Err(SummarizeError::Request("circuit open".to_string()))
            }
            RetryOutcome::ExhaustedRetries(e) => {
                warn!(error = %e, duration_ms = elapsed.as_millis() as u64, "summarize failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catchup_reliability::BreakerConfig;

    #[tokio::test]
    async fn cancelled_before_call_returns_cancelled_error() {
        let client = OpenAi::new("test-key", "gpt-4o-mini");
        let breaker = CircuitBreaker::new("summarizer-test", BreakerConfig::feed_fetch());
        let summarizer = AiClientSummarizer::new(client, breaker, Duration::from_secs(5));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = summarizer.summarize("some text", &cancel).await;
        assert!(matches!(result, Err(SummarizeError::Cancelled)));
    }
}
