//! Per-channel token-bucket rate limiting (spec.md §4.8), built on
//! `governor`. Acquire-or-wait respects cancellation.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter as GovernorLimiter};
use nonzero_ext::nonzero;

type DirectLimiter = GovernorLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A shared, cloneable rate limiter for one notifier channel.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<DirectLimiter>,
}

impl RateLimiter {
    fn from_quota(quota: Quota) -> Self {
        Self {
            inner: Arc::new(GovernorLimiter::direct(quota)),
        }
    }

    pub fn per_second(rate: NonZeroU32, burst: NonZeroU32) -> Self {
        Self::from_quota(Quota::per_second(rate).allow_burst(burst))
    }

    /// Discord preset: 0.5 req/s (one request per 2s), burst 3 (spec.md §4.8).
    pub fn discord() -> Self {
        Self::from_quota(Quota::with_period(std::time::Duration::from_secs(2)).unwrap().allow_burst(nonzero!(3u32)))
    }

    /// Slack preset: 1 req/s, burst 1 (spec.md §4.8).
    pub fn slack() -> Self {
        Self::per_second(nonzero!(1u32), nonzero!(1u32))
    }

    /// Wait for a permit, or return early if `cancel` fires first.
    pub async fn acquire(&self, cancel: &tokio_util::sync::CancellationToken) -> Result<(), Cancelled> {
        tokio::select! {
            _ = self.inner.until_ready() => Ok(()),
            _ = cancel.cancelled() => Err(Cancelled),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("rate limiter acquire cancelled")]
pub struct Cancelled;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_succeeds_without_cancellation() {
        let limiter = RateLimiter::slack();
        let cancel = tokio_util::sync::CancellationToken::new();
        assert!(limiter.acquire(&cancel).await.is_ok());
    }

    #[tokio::test]
    async fn acquire_aborts_on_cancellation() {
        let limiter = RateLimiter::per_second(nonzero!(1u32), nonzero!(1u32));
        let cancel = tokio_util::sync::CancellationToken::new();
        // consume the single burst slot
        assert!(limiter.acquire(&cancel).await.is_ok());
        cancel.cancel();
        assert!(limiter.acquire(&cancel).await.is_err());
    }
}
