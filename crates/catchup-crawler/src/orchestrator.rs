//! Crawl Orchestrator (C9, spec.md §4.9) — the heart of the system. Drives
//! one crawl pass: lists active sources, sequences per-source processing,
//! enforces the two-tier bounded-parallelism pipeline across C3-C8, and
//! aggregates [`CrawlStats`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use catchup_ai::Summarizer;
use catchup_core::{CrawlConfig, CrawlStats, FeedItem, NewArticle, Source, UrlGate};
use catchup_fetchers::{apply_policy, build_fetcher, ContentEnhancer, EnhanceOutcome};
use catchup_notify::NotifierFanout;
use catchup_reliability::{BackoffGrowth, CircuitBreaker, RetryConfig};
use catchup_store::{ArticleRepository, SourceRepository};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::CrawlFatal;

/// Notified on per-pass error reasons and per-item call latencies, so a
/// metrics sink can observe them without this crate depending on one
/// (spec.md §4.9/§10-11: crawl-pass errors and per-item timings must be
/// observable).
pub trait CrawlObserver: Send + Sync {
    fn record_error(&self, reason: &str);
    fn observe_content_fetch(&self, duration: Duration);
    fn observe_summarize(&self, duration: Duration);
}

/// Everything the orchestrator needs to run a pass. Cheap to clone: every
/// field is either `Copy`, a connection pool handle, or an `Arc`, so cloning
/// the whole orchestrator into a spawned per-item task is just refcount
/// bumps (spec.md §4.9: items within a source run concurrently, bounded by
/// the two semaphores below).
#[derive(Clone)]
pub struct CrawlOrchestrator {
    source_store: Arc<dyn SourceRepository>,
    article_store: Arc<dyn ArticleRepository>,
    config: CrawlConfig,
    client: reqwest::Client,
    gate: UrlGate,
    feed_fetch_breaker: Arc<CircuitBreaker>,
    content_enhancer: Option<Arc<dyn ContentEnhancer>>,
    summarizer: Arc<dyn Summarizer>,
    embedding_hook: Arc<catchup_ai::EmbeddingHook>,
    notifier: Arc<NotifierFanout>,
    content_slot: Arc<Semaphore>,
    summary_slot: Arc<Semaphore>,
    observer: Option<Arc<dyn CrawlObserver>>,
}

/// Accumulates per-item outcomes; merged into the pass-wide [`CrawlStats`]
/// with plain addition (spec.md §4.9: "counters are incremented with atomic
/// operations; the whole CrawlStats is returned by value at pass end").
#[derive(Default)]
struct ItemTally {
    inserted: AtomicU64,
    summarize_error: AtomicU64,
    content_skipped: AtomicU64,
    content_success: AtomicU64,
    content_failed: AtomicU64,
}

impl CrawlOrchestrator {
    pub fn new(
        source_store: Arc<dyn SourceRepository>,
        article_store: Arc<dyn ArticleRepository>,
        config: CrawlConfig,
        client: reqwest::Client,
        gate: UrlGate,
        feed_fetch_breaker: Arc<CircuitBreaker>,
        content_enhancer: Option<Arc<dyn ContentEnhancer>>,
        summarizer: Arc<dyn Summarizer>,
        embedding_hook: Arc<catchup_ai::EmbeddingHook>,
        notifier: Arc<NotifierFanout>,
    ) -> Self {
        let content_slot = Arc::new(Semaphore::new(config.content_slot_capacity));
        let summary_slot = Arc::new(Semaphore::new(config.summary_slot_capacity));
        Self {
            source_store,
            article_store,
            config,
            client,
            gate,
            feed_fetch_breaker,
            content_enhancer,
            summarizer,
            embedding_hook,
            notifier,
            content_slot,
            summary_slot,
            observer: None,
        }
    }

    /// Attaches a metrics observer, notified on pass-error reasons and
    /// per-item call latencies.
    pub fn with_observer(mut self, observer: Arc<dyn CrawlObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Runs one crawl pass over every active source, sequentially. Returns
    /// `Err(CrawlFatal)` only when the top-level context was cancelled or a
    /// store write failed mid-pass; any other failure is recorded in
    /// [`CrawlStats`] and the pass continues with the next source.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> Result<CrawlStats, CrawlFatal> {
        let start = Instant::now();
        let sources = self
            .source_store
            .list_active()
            .await
            .map_err(CrawlFatal::Store)?;

        let mut stats = CrawlStats {
            sources: sources.len() as u64,
            ..Default::default()
        };

        for source in &sources {
            if cancel.is_cancelled() {
                return Err(CrawlFatal::Cancelled);
            }
            self.process_source(source, cancel, &mut stats).await?;
        }

        stats.duration = start.elapsed();
        Ok(stats)
    }

    /// State machine for one source (spec.md §4.9):
    /// `selecting-fetcher` → `fetching` → `dedup-check` → `processing-items`
    /// → `finalizing`.
    async fn process_source(
        &self,
        source: &Source,
        cancel: &CancellationToken,
        stats: &mut CrawlStats,
    ) -> Result<(), CrawlFatal> {
        if let Err(e) = source.validate() {
            warn!(source_id = source.id, error = %e, "source failed validation, skipping this pass");
            if let Some(observer) = &self.observer {
                observer.record_error("invalid_source");
            }
            return Ok(());
        }

        let fetcher = build_fetcher(
            source.source_type,
            self.client.clone(),
            self.gate.clone(),
            retry_config_from_preset(self.config.feed_fetch_retry),
        );

        let items = match fetcher
            .fetch(
                &source.feed_url,
                source.scraper_config.as_ref(),
                &self.feed_fetch_breaker,
                cancel,
            )
            .await
        {
            Ok(items) => items,
            Err(e) => {
                if cancel.is_cancelled() {
                    return Err(CrawlFatal::Cancelled);
                }
                warn!(source_id = source.id, error = %e, "fetch failed, skipping source this pass");
                if let Some(observer) = &self.observer {
                    observer.record_error("fetch_failed");
                }
                return Ok(());
            }
        };
        stats.feed_items += items.len() as u64;

        let urls: Vec<String> = items.iter().map(|i| i.url.clone()).collect();
        let existing = match self.article_store.exists_by_url_batch(&urls).await {
            Ok(map) => map,
            Err(e) => {
                warn!(source_id = source.id, error = %e, "dedup batch check failed (batch_check_failed), leaving last_crawled_at untouched");
                if let Some(observer) = &self.observer {
                    observer.record_error("batch_check_failed");
                }
                return Ok(());
            }
        };

        // Two items sharing a URL within the same fetch (cross-posted or
        // pinned entries) would otherwise both pass the persisted-URL check
        // and race to insert; the second hits the `url` UNIQUE constraint
        // and aborts the whole pass. `seen_this_batch` catches that case
        // before it reaches the store.
        let mut seen_this_batch = std::collections::HashSet::with_capacity(items.len());
        let fresh: Vec<FeedItem> = items
            .into_iter()
            .filter(|item| {
                let already_persisted = existing.get(&item.url).copied().unwrap_or(false);
                let is_new = !already_persisted && seen_this_batch.insert(item.url.clone());
                if !is_new {
                    stats.duplicated += 1;
                }
                is_new
            })
            .collect();

        let tally = Arc::new(ItemTally::default());
        let mut tasks = tokio::task::JoinSet::new();
        for item in fresh {
            let orchestrator = self.clone();
            let source = source.clone();
            let cancel = cancel.clone();
            let tally = tally.clone();
            tasks.spawn(async move {
                orchestrator.process_item(item, &source, &cancel, &tally).await
            });
        }

        let mut fatal: Option<CrawlFatal> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    fatal.get_or_insert(e);
                }
                Err(join_err) => {
                    warn!(source_id = source.id, error = %join_err, "item task panicked");
                }
            }
        }

        stats.inserted += tally.inserted.load(Ordering::Relaxed);
        stats.summarize_error += tally.summarize_error.load(Ordering::Relaxed);
        stats.content_fetch_skipped += tally.content_skipped.load(Ordering::Relaxed);
        stats.content_fetch_success += tally.content_success.load(Ordering::Relaxed);
        stats.content_fetch_failed += tally.content_failed.load(Ordering::Relaxed);

        if let Some(e) = fatal {
            return Err(e);
        }

        self.source_store
            .mark_crawled(source.id, chrono::Utc::now())
            .await
            .map_err(CrawlFatal::Store)?;

        Ok(())
    }

    /// The per-item pipeline (spec.md §4.9 pseudocode), one instance per
    /// fresh `FeedItem`, bounded by `content_slot` then `summary_slot`.
    async fn process_item(
        &self,
        item: FeedItem,
        source: &Source,
        cancel: &CancellationToken,
        tally: &ItemTally,
    ) -> Result<(), CrawlFatal> {
        let body = {
            let _permit = self
                .content_slot
                .acquire()
                .await
                .expect("content_slot semaphore never closes");
            let fetch_start = Instant::now();
            let outcome = apply_policy(
                self.content_enhancer.as_deref(),
                &item.content,
                &item.url,
                self.config.content_enhance_threshold,
                &self.feed_fetch_breaker,
                cancel,
            )
            .await;
            if let Some(observer) = &self.observer {
                observer.observe_content_fetch(fetch_start.elapsed());
            }
            match outcome {
                EnhanceOutcome::Skipped(body) => {
                    tally.content_skipped.fetch_add(1, Ordering::Relaxed);
                    body
                }
                EnhanceOutcome::Success(body) => {
                    tally.content_success.fetch_add(1, Ordering::Relaxed);
                    body
                }
                EnhanceOutcome::Failed(body) => {
                    tally.content_failed.fetch_add(1, Ordering::Relaxed);
                    body
                }
            }
        };

        let _permit = self
            .summary_slot
            .acquire()
            .await
            .expect("summary_slot semaphore never closes");

        let summarize_start = Instant::now();
        let summarize_result = self.summarizer.summarize(&body, cancel).await;
        if let Some(observer) = &self.observer {
            observer.observe_summarize(summarize_start.elapsed());
        }
        let summary = match summarize_result {
            Ok(summary) => summary,
            Err(catchup_ai::SummarizeError::Cancelled) => {
                return Err(CrawlFatal::Cancelled);
            }
            Err(e) => {
                tally.summarize_error.fetch_add(1, Ordering::Relaxed);
                warn!(url = %item.url, error = %e, "summarize failed, skipping item");
                return Ok(());
            }
        };

        let article = self
            .article_store
            .insert(NewArticle {
                source_id: source.id,
                title: item.title,
                url: item.url,
                summary,
                published_at: item.published_at,
            })
            .await
            .map_err(CrawlFatal::Store)?;
        tally.inserted.fetch_add(1, Ordering::Relaxed);
        info!(article_id = article.id, source_id = source.id, "article inserted");

        let request_id = Uuid::new_v4().to_string();
        self.embedding_hook
            .embed_async(Some(article.clone()), request_id);

        let notifier = self.notifier.clone();
        let article_for_notify = article;
        tokio::spawn(async move {
            let detached = CancellationToken::new();
            notifier.notify_all(&article_for_notify, &detached).await;
        });

        Ok(())
    }
}

/// Converts `CrawlConfig.feed_fetch_retry` into the reliability crate's own
/// retry type, so an operator-set `max_attempts`/`base_delay` actually
/// reaches `HttpPhase::fetch` instead of the wrapper's hardcoded default.
fn retry_config_from_preset(preset: catchup_core::RetryPreset) -> RetryConfig {
    RetryConfig {
        max_attempts: preset.max_attempts,
        base_delay: preset.base_delay.0,
        growth: if preset.exponential {
            BackoffGrowth::Exponential
        } else {
            BackoffGrowth::Linear
        },
    }
}
