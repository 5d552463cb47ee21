//! Per-channel dispatch: rate limiter → optional circuit breaker → retry
//! policy (spec.md §4.8). One [`ChannelDispatcher`] per configured channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use catchup_core::Article;
use catchup_reliability::{CircuitBreaker, RateLimiter, RetryConfig};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::backend::NotifyBackend;
use crate::error::NotifyError;

/// Notified on every dispatch outcome and rate-limiter wait, so a metrics
/// sink can observe them without the notify crate depending on one.
pub trait NotifyObserver: Send + Sync {
    fn record_sent(&self, channel: &str, status: &str);
    fn observe_rate_limit_wait(&self, wait: Duration);
}

pub struct ChannelDispatcher {
    backend: Arc<dyn NotifyBackend>,
    rate_limiter: RateLimiter,
    breaker: Option<Arc<CircuitBreaker>>,
    retry: RetryConfig,
    observer: Option<Arc<dyn NotifyObserver>>,
}

impl ChannelDispatcher {
    pub fn new(
        backend: Arc<dyn NotifyBackend>,
        rate_limiter: RateLimiter,
        breaker: Option<Arc<CircuitBreaker>>,
    ) -> Self {
        Self {
            backend,
            rate_limiter,
            breaker,
            retry: RetryConfig::notifier(),
            observer: None,
        }
    }

    /// Overrides the default notifier retry policy with one read from
    /// `CrawlConfig.notifier_retry` (spec.md §4.8/§12).
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Attaches a metrics observer, notified on every send outcome and
    /// rate-limiter wait.
    pub fn with_observer(mut self, observer: Arc<dyn NotifyObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Fire-and-forget dispatch (spec.md §4.8: "failures never propagate
    /// upward"). At-most-one notification per (article, channel) per run is
    /// the caller's responsibility (it must not call this twice for the
    /// same article).
    pub async fn notify(&self, article: &Article, cancel: &CancellationToken) {
        let request_id = Uuid::new_v4().to_string();
        let channel = self.backend.channel_name();

        let wait_start = Instant::now();
        let acquired = self.rate_limiter.acquire(cancel).await;
        if let Some(observer) = &self.observer {
            observer.observe_rate_limit_wait(wait_start.elapsed());
        }
        if acquired.is_err() {
            warn!(channel, request_id, article_id = article.id, "notify cancelled waiting for rate limiter");
            return;
        }

        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return;
            }

            let send_result = match &self.breaker {
                Some(breaker) => {
                    match breaker.call(|| self.backend.send(article, &request_id)).await {
                        Ok(result) => result,
                        Err(_circuit_open) => {
                            warn!(channel, request_id, article_id = article.id, "notify skipped: circuit open");
                            self.record_sent(channel, "circuit_open");
                            return;
                        }
                    }
                }
                None => self.backend.send(article, &request_id).await,
            };

            match send_result {
                Ok(()) => {
                    self.record_sent(channel, "success");
                    return;
                }
                Err(NotifyError::RateLimited { retry_after }) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        warn!(channel, request_id, article_id = article.id, "notify gave up after rate limit");
                        self.record_sent(channel, "rate_limited");
                        return;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(retry_after) => {}
                        _ = cancel.cancelled() => return,
                    }
                }
                Err(e @ NotifyError::Status { status }) if status >= 500 => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        warn!(channel, request_id, article_id = article.id, error = %e, "notify gave up");
                        self.record_sent(channel, "server_error");
                        return;
                    }
                    let delay = self.retry.delay_for(attempt - 1);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return,
                    }
                }
                Err(NotifyError::Request(_)) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        warn!(channel, request_id, article_id = article.id, "notify gave up after network error");
                        self.record_sent(channel, "network_error");
                        return;
                    }
                    let delay = self.retry.delay_for(attempt - 1);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return,
                    }
                }
                Err(e @ NotifyError::Status { .. }) => {
                    warn!(channel, request_id, article_id = article.id, error = %e, "notify failed with non-retryable status");
                    self.record_sent(channel, "client_error");
                    return;
                }
            }
        }
    }

    fn record_sent(&self, channel: &str, status: &str) {
        if let Some(observer) = &self.observer {
            observer.record_sent(channel, status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catchup_reliability::BreakerConfig;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn sample_article() -> Article {
        Article {
            id: 1,
            source_id: 1,
            title: "Title".to_string(),
            url: "https://example.com/a".to_string(),
            summary: "Summary".to_string(),
            published_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    struct CountingBackend {
        calls: AtomicU32,
        fail_times: u32,
    }

    #[async_trait::async_trait]
    impl NotifyBackend for CountingBackend {
        async fn send(&self, _article: &Article, _request_id: &str) -> crate::error::NotifyResult<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(NotifyError::Status { status: 503 })
            } else {
                Ok(())
            }
        }

        fn channel_name(&self) -> &str {
            "test"
        }
    }

    #[tokio::test]
    async fn retries_once_on_5xx_then_succeeds() {
        let backend = Arc::new(CountingBackend {
            calls: AtomicU32::new(0),
            fail_times: 1,
        });
        let dispatcher = ChannelDispatcher::new(
            backend.clone(),
            RateLimiter::per_second(
                std::num::NonZeroU32::new(100).unwrap(),
                std::num::NonZeroU32::new(100).unwrap(),
            ),
            None,
        );
        let cancel = CancellationToken::new();
        dispatcher.notify(&sample_article(), &cancel).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let backend = Arc::new(CountingBackend {
            calls: AtomicU32::new(0),
            fail_times: 10,
        });
        let dispatcher = ChannelDispatcher::new(
            backend.clone(),
            RateLimiter::per_second(
                std::num::NonZeroU32::new(100).unwrap(),
                std::num::NonZeroU32::new(100).unwrap(),
            ),
            None,
        );
        let cancel = CancellationToken::new();
        dispatcher.notify(&sample_article(), &cancel).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    struct AlwaysOkBackend;
    #[async_trait::async_trait]
    impl NotifyBackend for AlwaysOkBackend {
        async fn send(&self, _article: &Article, _request_id: &str) -> crate::error::NotifyResult<()> {
            Ok(())
        }
        fn channel_name(&self) -> &str {
            "test"
        }
    }

    #[tokio::test]
    async fn open_circuit_skips_without_calling_backend() {
        let breaker = Arc::new(CircuitBreaker::new(
            "test",
            BreakerConfig {
                failure_threshold: 0.1,
                min_requests: 1,
                interval: std::time::Duration::from_secs(60),
                open_timeout: std::time::Duration::from_secs(60),
                half_open_max_requests: 1,
            },
        ));
        // trip it
        let _ = breaker.call(|| async { Err::<(), _>("boom") }).await;

        let dispatcher = ChannelDispatcher::new(
            Arc::new(AlwaysOkBackend),
            RateLimiter::per_second(
                std::num::NonZeroU32::new(100).unwrap(),
                std::num::NonZeroU32::new(100).unwrap(),
            ),
            Some(breaker),
        );
        let cancel = CancellationToken::new();
        dispatcher.notify(&sample_article(), &cancel).await;
    }
}
