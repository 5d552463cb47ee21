//! Notifier Fanout (C8, spec.md §4.8). Each channel is one `NotifyBackend`
//! implementation; retry/rate-limit/circuit-breaker policy lives in
//! [`crate::dispatch`], which wraps any backend uniformly.

use async_trait::async_trait;
use catchup_core::Article;

use crate::error::NotifyResult;

#[async_trait]
pub trait NotifyBackend: Send + Sync {
    /// Post a single article notification. Implementations perform one HTTP
    /// request per call; the dispatcher owns retry/rate-limit/breaker
    /// policy, not the backend.
    async fn send(&self, article: &Article, request_id: &str) -> NotifyResult<()>;

    fn channel_name(&self) -> &str;
}
