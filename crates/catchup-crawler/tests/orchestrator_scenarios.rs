//! End-to-end scenarios for the crawl orchestrator (C9, spec.md §8), run
//! against in-memory fakes (SPEC_FULL.md §13) plus a real `wiremock` HTTP
//! server standing in for the feed source — no Postgres required.

mod support;

use std::num::NonZeroU32;
use std::sync::Arc;

use catchup_ai::EmbeddingHook;
use catchup_core::{CrawlConfig, GateOptions, UrlGate};
use catchup_crawler::{CrawlFatal, CrawlOrchestrator};
use catchup_notify::{ChannelDispatcher, NotifierFanout};
use catchup_reliability::{BreakerConfig, CircuitBreaker, RateLimiter};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{
    sample_source, FakeArticleStore, FakeSourceStore, RecordingNotifyBackend, ScriptedSummarizer,
};

const SAMPLE_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Example Feed</title>
  <item>
    <title>First post</title>
    <link>https://example.com/first</link>
    <description>First post body</description>
  </item>
</channel></rss>"#;

fn minimal_config() -> CrawlConfig {
    let toml = r#"
        [ai_service]
        [ai_service.search]
        default_limit = 10
        max_limit = 50
        default_min_similarity = 0.7
        default_max_context = 5
        max_context = 20
    "#;
    CrawlConfig::from_toml_str(toml).expect("minimal config should parse")
}

fn orchestrator(
    source_store: Arc<FakeSourceStore>,
    article_store: Arc<FakeArticleStore>,
    summarizer: ScriptedSummarizer,
    notify_backend: Arc<RecordingNotifyBackend>,
) -> CrawlOrchestrator {
    let breaker = Arc::new(CircuitBreaker::new("feed-fetch-test", BreakerConfig::feed_fetch()));
    let rate_limiter =
        RateLimiter::per_second(NonZeroU32::new(100).unwrap(), NonZeroU32::new(100).unwrap());
    let notifier = Arc::new(NotifierFanout::new(vec![ChannelDispatcher::new(
        notify_backend,
        rate_limiter,
        None,
    )]));

    CrawlOrchestrator::new(
        source_store,
        article_store,
        minimal_config(),
        reqwest::Client::new(),
        UrlGate::new(GateOptions {
            allow_loopback_ephemeral_ports: true,
        }),
        breaker,
        None,
        Arc::new(summarizer),
        Arc::new(EmbeddingHook::new(None)),
        notifier,
    )
}

#[tokio::test]
async fn happy_path_inserts_and_notifies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_RSS))
        .mount(&server)
        .await;

    let source = sample_source(1, format!("{}/feed.xml", server.uri()));
    let source_store = Arc::new(FakeSourceStore::new(vec![source]));
    let article_store = Arc::new(FakeArticleStore::new());
    let notify_backend = Arc::new(RecordingNotifyBackend::new());

    let orchestrator = orchestrator(
        source_store.clone(),
        article_store.clone(),
        ScriptedSummarizer::always_succeeds(),
        notify_backend.clone(),
    );

    let cancel = CancellationToken::new();
    let stats = orchestrator.run_pass(&cancel).await.expect("pass should succeed");

    assert_eq!(stats.sources, 1);
    assert_eq!(stats.feed_items, 1);
    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.duplicated, 0);
    assert_eq!(article_store.inserted().len(), 1);
    assert_eq!(source_store.crawled_ids(), vec![1]);

    // notify is fire-and-forget on a detached spawn; give it a moment.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(notify_backend.sent_article_ids().len(), 1);
}

#[tokio::test]
async fn dedup_path_skips_known_urls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_RSS))
        .mount(&server)
        .await;

    let source = sample_source(1, format!("{}/feed.xml", server.uri()));
    let source_store = Arc::new(FakeSourceStore::new(vec![source]));
    let article_store = Arc::new(FakeArticleStore::seeded_with_urls(&["https://example.com/first"]));
    let notify_backend = Arc::new(RecordingNotifyBackend::new());

    let orchestrator = orchestrator(
        source_store,
        article_store.clone(),
        ScriptedSummarizer::always_succeeds(),
        notify_backend,
    );

    let cancel = CancellationToken::new();
    let stats = orchestrator.run_pass(&cancel).await.expect("pass should succeed");

    assert_eq!(stats.feed_items, 1);
    assert_eq!(stats.duplicated, 1);
    assert_eq!(stats.inserted, 0);
    assert_eq!(article_store.inserted().len(), 1, "only the seeded article should exist");
}

#[tokio::test]
async fn duplicate_urls_within_one_batch_insert_only_once() {
    const DUPLICATE_URL_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Example Feed</title>
  <item>
    <title>First post</title>
    <link>https://example.com/cross-posted</link>
    <description>First post body</description>
  </item>
  <item>
    <title>Same post, different title</title>
    <link>https://example.com/cross-posted</link>
    <description>Second post body</description>
  </item>
</channel></rss>"#;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DUPLICATE_URL_RSS))
        .mount(&server)
        .await;

    let source = sample_source(1, format!("{}/feed.xml", server.uri()));
    let source_store = Arc::new(FakeSourceStore::new(vec![source]));
    let article_store = Arc::new(FakeArticleStore::new());
    let notify_backend = Arc::new(RecordingNotifyBackend::new());

    let orchestrator = orchestrator(
        source_store,
        article_store.clone(),
        ScriptedSummarizer::always_succeeds(),
        notify_backend,
    );

    let cancel = CancellationToken::new();
    let stats = orchestrator.run_pass(&cancel).await.expect("pass should succeed, not abort");

    assert_eq!(stats.feed_items, 2);
    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.duplicated, 1, "the second same-URL item counts as a duplicate");
    assert_eq!(article_store.inserted().len(), 1);
}

#[tokio::test]
async fn summarize_failure_is_counted_not_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_RSS))
        .mount(&server)
        .await;

    let source = sample_source(1, format!("{}/feed.xml", server.uri()));
    let source_store = Arc::new(FakeSourceStore::new(vec![source]));
    let article_store = Arc::new(FakeArticleStore::new());
    let notify_backend = Arc::new(RecordingNotifyBackend::new());

    let orchestrator = orchestrator(
        source_store.clone(),
        article_store.clone(),
        ScriptedSummarizer::failing_on(vec!["First post body".to_string()]),
        notify_backend,
    );

    let cancel = CancellationToken::new();
    let stats = orchestrator.run_pass(&cancel).await.expect("pass should still succeed");

    assert_eq!(stats.summarize_error, 1);
    assert_eq!(stats.inserted, 0);
    assert!(article_store.inserted().is_empty());
    assert_eq!(source_store.crawled_ids(), vec![1], "last_crawled_at still updates");
}

#[tokio::test]
async fn persist_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_RSS))
        .mount(&server)
        .await;

    let source = sample_source(1, format!("{}/feed.xml", server.uri()));
    let source_store = Arc::new(FakeSourceStore::new(vec![source]));
    let article_store = Arc::new(FakeArticleStore::failing_insert());
    let notify_backend = Arc::new(RecordingNotifyBackend::new());

    let orchestrator = orchestrator(
        source_store.clone(),
        article_store,
        ScriptedSummarizer::always_succeeds(),
        notify_backend,
    );

    let cancel = CancellationToken::new();
    let result = orchestrator.run_pass(&cancel).await;

    assert!(matches!(result, Err(CrawlFatal::Store(_))));
    assert!(source_store.crawled_ids().is_empty(), "a fatal item error must not mark the source crawled");
}

#[tokio::test]
async fn fetch_failure_is_recoverable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let source = sample_source(1, format!("{}/feed.xml", server.uri()));
    let source_store = Arc::new(FakeSourceStore::new(vec![source]));
    let article_store = Arc::new(FakeArticleStore::new());
    let notify_backend = Arc::new(RecordingNotifyBackend::new());

    let orchestrator = orchestrator(
        source_store.clone(),
        article_store,
        ScriptedSummarizer::always_succeeds(),
        notify_backend,
    );

    let cancel = CancellationToken::new();
    let stats = orchestrator.run_pass(&cancel).await.expect("a single source's fetch failure is not fatal");

    assert_eq!(stats.sources, 1);
    assert_eq!(stats.feed_items, 0);
    assert!(source_store.crawled_ids().is_empty(), "last_crawled_at must not advance on fetch failure");
}

#[tokio::test]
async fn private_ip_feed_url_is_rejected_by_the_gate() {
    let source = sample_source(1, "http://10.0.0.1/feed.xml".to_string());
    let source_store = Arc::new(FakeSourceStore::new(vec![source]));
    let article_store = Arc::new(FakeArticleStore::new());
    let notify_backend = Arc::new(RecordingNotifyBackend::new());

    let orchestrator = orchestrator(
        source_store.clone(),
        article_store,
        ScriptedSummarizer::always_succeeds(),
        notify_backend,
    );

    let cancel = CancellationToken::new();
    let stats = orchestrator
        .run_pass(&cancel)
        .await
        .expect("an SSRF-rejected source must not fail the whole pass");

    assert_eq!(stats.feed_items, 0);
    assert!(source_store.crawled_ids().is_empty());
}
