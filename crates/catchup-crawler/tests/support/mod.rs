//! In-memory fakes backing the orchestrator scenario tests (SPEC_FULL.md
//! §13: "no real Postgres needed for the crawl orchestrator's own test
//! suite"). Each fake implements the same trait its `Pg`-backed counterpart
//! does, so `CrawlOrchestrator` cannot tell the difference.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use catchup_ai::{SummarizeError, SummarizeResult, Summarizer};
use catchup_core::{Article, NewArticle, Source};
use catchup_notify::{NotifyBackend, NotifyResult};
use catchup_store::{ArticleRepository, SourceRepository, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

/// A fixed set of sources, read-only aside from `mark_crawled`.
pub struct FakeSourceStore {
    sources: Vec<Source>,
    crawled: Mutex<Vec<i64>>,
}

impl FakeSourceStore {
    pub fn new(sources: Vec<Source>) -> Self {
        Self {
            sources,
            crawled: Mutex::new(Vec::new()),
        }
    }

    pub fn crawled_ids(&self) -> Vec<i64> {
        self.crawled.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceRepository for FakeSourceStore {
    async fn list_active(&self) -> StoreResult<Vec<Source>> {
        Ok(self.sources.iter().filter(|s| s.active).cloned().collect())
    }

    async fn mark_crawled(&self, source_id: i64, _at: DateTime<Utc>) -> StoreResult<()> {
        self.crawled.lock().unwrap().push(source_id);
        Ok(())
    }
}

/// Article storage backed by a `Vec` behind a mutex, with dedup keyed on
/// `url` just like the real store's unique constraint.
#[derive(Default)]
pub struct FakeArticleStore {
    articles: Mutex<Vec<Article>>,
    next_id: AtomicI64,
    fail_insert: bool,
}

impl FakeArticleStore {
    pub fn new() -> Self {
        Self {
            articles: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            fail_insert: false,
        }
    }

    pub fn seeded_with_urls(urls: &[&str]) -> Self {
        let store = Self::new();
        let mut articles = store.articles.lock().unwrap();
        for url in urls {
            let id = store.next_id.fetch_add(1, Ordering::SeqCst);
            articles.push(Article {
                id,
                source_id: 0,
                title: "seed".to_string(),
                url: url.to_string(),
                summary: "seed".to_string(),
                published_at: Utc::now(),
                created_at: Utc::now(),
            });
        }
        drop(articles);
        store
    }

    pub fn failing_insert() -> Self {
        Self {
            fail_insert: true,
            ..Self::new()
        }
    }

    pub fn inserted(&self) -> Vec<Article> {
        self.articles.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArticleRepository for FakeArticleStore {
    async fn exists_by_url_batch(&self, urls: &[String]) -> StoreResult<HashMap<String, bool>> {
        let articles = self.articles.lock().unwrap();
        Ok(urls
            .iter()
            .map(|u| (u.clone(), articles.iter().any(|a| &a.url == u)))
            .collect())
    }

    async fn insert(&self, new_article: NewArticle) -> StoreResult<Article> {
        if self.fail_insert {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let article = Article {
            id,
            source_id: new_article.source_id,
            title: new_article.title,
            url: new_article.url,
            summary: new_article.summary,
            published_at: new_article.published_at,
            created_at: Utc::now(),
        };
        self.articles.lock().unwrap().push(article.clone());
        Ok(article)
    }

    async fn list_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Article>> {
        Ok(self
            .articles
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.created_at >= since)
            .cloned()
            .collect())
    }
}

/// A summarizer whose outcome for a given input text is controlled by the
/// test: returns the text itself prefixed with "summary:", unless the text
/// is flagged to fail or to simulate cancellation.
pub struct ScriptedSummarizer {
    fail_on: Vec<String>,
}

impl ScriptedSummarizer {
    pub fn always_succeeds() -> Self {
        Self { fail_on: Vec::new() }
    }

    pub fn failing_on(urls_or_bodies: Vec<String>) -> Self {
        Self {
            fail_on: urls_or_bodies,
        }
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn summarize(&self, text: &str, cancel: &CancellationToken) -> SummarizeResult<String> {
        if cancel.is_cancelled() {
            return Err(SummarizeError::Cancelled);
        }
        if self.fail_on.iter().any(|needle| text.contains(needle)) {
            return Err(SummarizeError::Request("scripted failure".to_string()));
        }
        Ok(format!("summary: {text}"))
    }
}

/// Records every article it was asked to notify about; never fails.
#[derive(Default)]
pub struct RecordingNotifyBackend {
    sent: Mutex<Vec<i64>>,
}

impl RecordingNotifyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_article_ids(&self) -> Vec<i64> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifyBackend for RecordingNotifyBackend {
    async fn send(&self, article: &Article, _request_id: &str) -> NotifyResult<()> {
        self.sent.lock().unwrap().push(article.id);
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "test"
    }
}

pub fn sample_source(id: i64, feed_url: String) -> Source {
    Source {
        id,
        name: format!("source-{id}"),
        feed_url,
        active: true,
        last_crawled_at: None,
        source_type: catchup_core::SourceType::Rss,
        scraper_config: None,
    }
}
