//! Prometheus metrics registry (C10, SPEC_FULL.md §11). Grounded on
//! `other_examples/miketigerblue-rust-feed-ingestor`'s `metrics` module —
//! the closest real-world feed ingestor in the retrieval pack to wire
//! `prometheus` this way.

use std::time::Duration;

use catchup_ai::EmbedObserver;
use catchup_crawler::CrawlObserver;
use catchup_notify::NotifyObserver;
use catchup_reliability::{BreakerObserver, BreakerState};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    pub sources_total: IntCounter,
    pub items_total: IntCounter,
    pub inserted_total: IntCounter,
    pub duplicated_total: IntCounter,
    pub error_total: IntCounterVec,
    pub summarize_error_total: IntCounter,
    pub summarize_duration_seconds: Histogram,
    pub content_fetch_skipped_total: IntCounter,
    pub content_fetch_success_total: IntCounter,
    pub content_fetch_failed_total: IntCounter,
    pub content_fetch_duration_seconds: Histogram,
    pub embed_pending: IntGauge,
    pub embed_processed_total: IntCounterVec,
    pub circuit_breaker_state: IntGaugeVec,
    pub notify_sent_total: IntCounterVec,
    pub notify_rate_limit_wait_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let sources_total = IntCounter::new(
            "feed_crawl_sources_total",
            "Active sources visited across all passes",
        )?;
        let items_total = IntCounter::new(
            "feed_crawl_items_total",
            "Feed items observed across all passes",
        )?;
        let inserted_total =
            IntCounter::new("feed_crawl_inserted_total", "Articles persisted")?;
        let duplicated_total =
            IntCounter::new("feed_crawl_duplicated_total", "Items skipped as duplicates")?;
        let error_total = IntCounterVec::new(
            Opts::new("feed_crawl_error_total", "Crawl pass errors by reason"),
            &["reason"],
        )?;
        let summarize_error_total = IntCounter::new(
            "summarize_error_total",
            "Summarizer calls that returned a non-cancellation error",
        )?;
        let summarize_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "summarize_duration_seconds",
            "Summarizer call latency",
        ))?;
        let content_fetch_skipped_total = IntCounter::new(
            "content_fetch_skipped_total",
            "Content-enhance policy decisions that skipped enhancement",
        )?;
        let content_fetch_success_total = IntCounter::new(
            "content_fetch_success_total",
            "Content-enhance attempts that succeeded",
        )?;
        let content_fetch_failed_total = IntCounter::new(
            "content_fetch_failed_total",
            "Content-enhance attempts that failed",
        )?;
        let content_fetch_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "content_fetch_duration_seconds",
            "Content-enhance call latency",
        ))?;
        let embed_pending = IntGauge::new(
            "embed_pending",
            "Embedding requests scheduled but not yet resolved",
        )?;
        let embed_processed_total = IntCounterVec::new(
            Opts::new("embed_processed_total", "Embedding task outcomes"),
            &["status"],
        )?;
        let circuit_breaker_state = IntGaugeVec::new(
            Opts::new(
                "circuit_breaker_state",
                "0=closed, 1=open, 2=half-open, by target",
            ),
            &["target"],
        )?;
        let notify_sent_total = IntCounterVec::new(
            Opts::new("notify_sent_total", "Notification attempts by channel/status"),
            &["channel", "status"],
        )?;
        let notify_rate_limit_wait_seconds = Histogram::with_opts(HistogramOpts::new(
            "notify_rate_limit_wait_seconds",
            "Time spent waiting on the per-channel rate limiter",
        ))?;

        for collector in [
            Box::new(sources_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(items_total.clone()),
            Box::new(inserted_total.clone()),
            Box::new(duplicated_total.clone()),
            Box::new(error_total.clone()),
            Box::new(summarize_error_total.clone()),
            Box::new(summarize_duration_seconds.clone()),
            Box::new(content_fetch_skipped_total.clone()),
            Box::new(content_fetch_success_total.clone()),
            Box::new(content_fetch_failed_total.clone()),
            Box::new(content_fetch_duration_seconds.clone()),
            Box::new(embed_pending.clone()),
            Box::new(embed_processed_total.clone()),
            Box::new(circuit_breaker_state.clone()),
            Box::new(notify_sent_total.clone()),
            Box::new(notify_rate_limit_wait_seconds.clone()),
        ] {
            registry.register(collector)?;
        }

        Ok(Self {
            registry,
            sources_total,
            items_total,
            inserted_total,
            duplicated_total,
            error_total,
            summarize_error_total,
            summarize_duration_seconds,
            content_fetch_skipped_total,
            content_fetch_success_total,
            content_fetch_failed_total,
            content_fetch_duration_seconds,
            embed_pending,
            embed_processed_total,
            circuit_breaker_state,
            notify_sent_total,
            notify_rate_limit_wait_seconds,
        })
    }

    /// Folds one pass's [`catchup_core::CrawlStats`] into the counters.
    pub fn observe_pass(&self, stats: &catchup_core::CrawlStats) {
        self.sources_total.inc_by(stats.sources);
        self.items_total.inc_by(stats.feed_items);
        self.inserted_total.inc_by(stats.inserted);
        self.duplicated_total.inc_by(stats.duplicated);
        self.summarize_error_total.inc_by(stats.summarize_error);
        self.content_fetch_skipped_total
            .inc_by(stats.content_fetch_skipped);
        self.content_fetch_success_total
            .inc_by(stats.content_fetch_success);
        self.content_fetch_failed_total
            .inc_by(stats.content_fetch_failed);
    }

    pub fn gather(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .expect("prometheus encoding is infallible for well-formed collectors");
        buffer
    }
}

fn encode_breaker_state(state: BreakerState) -> i64 {
    match state {
        BreakerState::Closed => 0,
        BreakerState::Open => 1,
        BreakerState::HalfOpen => 2,
    }
}

impl BreakerObserver for Metrics {
    fn on_transition(&self, name: &str, state: BreakerState) {
        self.circuit_breaker_state
            .with_label_values(&[name])
            .set(encode_breaker_state(state));
    }
}

impl NotifyObserver for Metrics {
    fn record_sent(&self, channel: &str, status: &str) {
        self.notify_sent_total.with_label_values(&[channel, status]).inc();
    }

    fn observe_rate_limit_wait(&self, wait: Duration) {
        self.notify_rate_limit_wait_seconds.observe(wait.as_secs_f64());
    }
}

impl EmbedObserver for Metrics {
    fn on_scheduled(&self) {
        self.embed_pending.inc();
    }

    fn on_resolved(&self, status: &str) {
        self.embed_pending.dec();
        self.embed_processed_total.with_label_values(&[status]).inc();
    }
}

impl CrawlObserver for Metrics {
    fn record_error(&self, reason: &str) {
        self.error_total.with_label_values(&[reason]).inc();
    }

    fn observe_content_fetch(&self, duration: Duration) {
        self.content_fetch_duration_seconds.observe(duration.as_secs_f64());
    }

    fn observe_summarize(&self, duration: Duration) {
        self.summarize_duration_seconds.observe(duration.as_secs_f64());
    }
}
