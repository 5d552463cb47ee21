//! Embedding Hook (C7, spec.md §4.7): fire-and-forget async embedder with a
//! pending-operations gauge. The request runs under a detached context (a
//! fresh, unlinked `CancellationToken` with its own 30s deadline) so caller
//! cancellation does not cancel embedding in flight.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catchup_core::Article;
use futures::FutureExt;
use tracing::{error, warn};

const DETACHED_DEADLINE: Duration = Duration::from_secs(30);

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, article: &Article) -> anyhow::Result<()>;
}

/// Notified when an embedding task is scheduled and when it resolves, so a
/// metrics sink can gauge `pending` and count `processed{status}` without
/// this crate depending on one (spec.md §4.7 invariants).
pub trait EmbedObserver: Send + Sync {
    fn on_scheduled(&self);
    fn on_resolved(&self, status: &str);
}

/// Counters backing the `pending` gauge and `processed{status}` counter
/// (spec.md §4.7 invariants).
#[derive(Default)]
pub struct EmbeddingMetrics {
    pending: AtomicI64,
    success: AtomicI64,
    failure: AtomicI64,
    panics: AtomicI64,
}

impl EmbeddingMetrics {
    pub fn pending(&self) -> i64 {
        self.pending.load(Ordering::Relaxed)
    }
    pub fn success_count(&self) -> i64 {
        self.success.load(Ordering::Relaxed)
    }
    pub fn failure_count(&self) -> i64 {
        self.failure.load(Ordering::Relaxed)
    }
    pub fn panic_count(&self) -> i64 {
        self.panics.load(Ordering::Relaxed)
    }
}

/// Schedules embeddings without blocking the caller (spec.md §4.7).
pub struct EmbeddingHook {
    embedder: Option<Arc<dyn Embedder>>,
    metrics: Arc<EmbeddingMetrics>,
    observer: Option<Arc<dyn EmbedObserver>>,
}

impl EmbeddingHook {
    /// `embedder = None` means the feature is disabled: `embed_async`
    /// becomes a no-op and no work is scheduled (spec.md §4.7 invariant).
    pub fn new(embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            embedder,
            metrics: Arc::new(EmbeddingMetrics::default()),
            observer: None,
        }
    }

    /// Attaches a metrics observer, notified on schedule/resolve.
    pub fn with_observer(mut self, observer: Arc<dyn EmbedObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn metrics(&self) -> Arc<EmbeddingMetrics> {
        self.metrics.clone()
    }

    /// Fire-and-forget: spawns the embedding task on a detached context and
    /// returns immediately. `article` is `Option` to model "nil article ->
    /// no-op with a warning log".
    pub fn embed_async(&self, article: Option<Article>, request_id: String) {
        let Some(embedder) = self.embedder.clone() else {
            return;
        };
        let Some(article) = article else {
            warn!(request_id, "embed_async called with nil article");
            return;
        };

        let metrics = self.metrics.clone();
        let observer = self.observer.clone();
        metrics.pending.fetch_add(1, Ordering::Relaxed);
        if let Some(observer) = &observer {
            observer.on_scheduled();
        }

        tokio::spawn(async move {
            let result = tokio::time::timeout(
                DETACHED_DEADLINE,
                AssertUnwindSafe(embedder.embed(&article)).catch_unwind(),
            )
            .await;

            metrics.pending.fetch_sub(1, Ordering::Relaxed);

            let status = match result {
                Ok(Ok(Ok(()))) => {
                    metrics.success.fetch_add(1, Ordering::Relaxed);
                    "success"
                }
                Ok(Ok(Err(e))) => {
                    metrics.failure.fetch_add(1, Ordering::Relaxed);
                    warn!(request_id, article_id = article.id, error = %e, "embedding failed");
                    "failure"
                }
                Ok(Err(panic)) => {
                    metrics.panics.fetch_add(1, Ordering::Relaxed);
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic payload".to_string());
                    error!(
                        request_id,
                        article_id = article.id,
                        panic = %message,
                        "embedding task panicked"
                    );
                    "panic"
                }
                Err(_elapsed) => {
                    metrics.failure.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        request_id,
                        article_id = article.id,
                        "embedding task exceeded detached deadline"
                    );
                    "timeout"
                }
            };
            if let Some(observer) = &observer {
                observer.on_resolved(status);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

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

    struct OkEmbedder;
    #[async_trait]
    impl Embedder for OkEmbedder {
        async fn embed(&self, _article: &Article) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct FailingEmbedder;
    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _article: &Article) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }
    }

    struct PanickingEmbedder;
    #[async_trait]
    impl Embedder for PanickingEmbedder {
        async fn embed(&self, _article: &Article) -> anyhow::Result<()> {
            panic!("embedding exploded");
        }
    }

    #[tokio::test]
    async fn disabled_hook_is_a_noop() {
        let hook = EmbeddingHook::new(None);
        hook.embed_async(Some(sample_article()), "req-1".to_string());
        assert_eq!(hook.metrics().pending(), 0);
    }

    #[tokio::test]
    async fn nil_article_is_a_noop() {
        let hook = EmbeddingHook::new(Some(Arc::new(OkEmbedder)));
        hook.embed_async(None, "req-1".to_string());
        assert_eq!(hook.metrics().pending(), 0);
    }

    #[tokio::test]
    async fn success_increments_then_decrements_pending() {
        let hook = EmbeddingHook::new(Some(Arc::new(OkEmbedder)));
        let metrics = hook.metrics();
        hook.embed_async(Some(sample_article()), "req-1".to_string());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(metrics.pending(), 0);
        assert_eq!(metrics.success_count(), 1);
    }

    #[tokio::test]
    async fn failure_is_recorded() {
        let hook = EmbeddingHook::new(Some(Arc::new(FailingEmbedder)));
        let metrics = hook.metrics();
        hook.embed_async(Some(sample_article()), "req-1".to_string());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(metrics.pending(), 0);
        assert_eq!(metrics.failure_count(), 1);
    }

    #[tokio::test]
    async fn panic_is_recovered_and_recorded() {
        let hook = EmbeddingHook::new(Some(Arc::new(PanickingEmbedder)));
        let metrics = hook.metrics();
        hook.embed_async(Some(sample_article()), "req-1".to_string());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(metrics.pending(), 0);
        assert_eq!(metrics.panic_count(), 1);
    }
}
