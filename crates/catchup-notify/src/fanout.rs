//! Fans a single article out to every configured channel (spec.md §4.8:
//! "each configured channel gets its own rate limiter, circuit breaker, and
//! retry policy; one channel's failure never blocks another").
//!
//! Grounded on the teacher's `NotifyRouter`, generalized from a fixed
//! flags/digest pair of Slack backends to an arbitrary set of channels.

use catchup_core::Article;
use tokio_util::sync::CancellationToken;

use crate::dispatch::ChannelDispatcher;

pub struct NotifierFanout {
    dispatchers: Vec<ChannelDispatcher>,
}

impl NotifierFanout {
    pub fn new(dispatchers: Vec<ChannelDispatcher>) -> Self {
        Self { dispatchers }
    }

    /// Dispatches to every channel concurrently. Each channel's retry/backoff
    /// runs independently; a slow or failing channel never delays another.
    pub async fn notify_all(&self, article: &Article, cancel: &CancellationToken) {
        let sends = self
            .dispatchers
            .iter()
            .map(|d| d.notify(article, cancel));
        futures::future::join_all(sends).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NotifyBackend;
    use crate::error::NotifyResult;
    use catchup_reliability::RateLimiter;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

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
        name: &'static str,
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl NotifyBackend for CountingBackend {
        async fn send(&self, _article: &Article, _request_id: &str) -> NotifyResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn channel_name(&self) -> &str {
            self.name
        }
    }

    fn unlimited_rate_limiter() -> RateLimiter {
        RateLimiter::per_second(
            std::num::NonZeroU32::new(100).unwrap(),
            std::num::NonZeroU32::new(100).unwrap(),
        )
    }

    #[tokio::test]
    async fn dispatches_to_every_channel() {
        let discord = Arc::new(CountingBackend {
            name: "discord",
            calls: AtomicU32::new(0),
        });
        let slack = Arc::new(CountingBackend {
            name: "slack",
            calls: AtomicU32::new(0),
        });

        let fanout = NotifierFanout::new(vec![
            ChannelDispatcher::new(discord.clone(), unlimited_rate_limiter(), None),
            ChannelDispatcher::new(slack.clone(), unlimited_rate_limiter(), None),
        ]);

        let cancel = CancellationToken::new();
        fanout.notify_all(&sample_article(), &cancel).await;

        assert_eq!(discord.calls.load(Ordering::SeqCst), 1);
        assert_eq!(slack.calls.load(Ordering::SeqCst), 1);
    }
}
