//! Remix adapter (spec.md §4.3): locate `window.__remixContext = { … };` via
//! a multiline-tolerant regex; pick route entry at `routes[context_key]` (or
//! the first route carrying `loaderData` when `context_key` is empty);
//! iterate `loaderData.issues[]`.

use async_trait::async_trait;
use catchup_core::{FeedItem, ScraperConfig, SourceType};
use catchup_reliability::CircuitBreaker;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, FetchResult};
use crate::fetcher::FeedFetcher;
use crate::http_phase::HttpPhase;

pub struct RemixFetcher {
    http: HttpPhase,
}

impl RemixFetcher {
    pub fn new(http: HttpPhase) -> Self {
        Self { http }
    }
}

fn extract_remix_context(html: &str) -> FetchResult<Value> {
    let re = Regex::new(r"(?s)window\.__remixContext\s*=\s*(\{.*?\});")
        .expect("valid regex");
    let captured = re
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or_else(|| FetchError::Parse("window.__remixContext not found".to_string()))?;
    serde_json::from_str(captured.as_str()).map_err(|e| FetchError::Parse(e.to_string()))
}

fn select_route<'a>(context: &'a Value, context_key: Option<&str>) -> Option<&'a Value> {
    let routes = context.pointer("/state/loaderData").or_else(|| context.get("routes"))?;
    if let Some(key) = context_key.filter(|k| !k.is_empty()) {
        return routes.get(key);
    }
    routes.as_object()?.values().find(|v| v.get("loaderData").is_some())
}

fn join_url(prefix: Option<&str>, slug: &str) -> String {
    match prefix {
        Some(p) => format!("{}/{}", p.trim_end_matches('/'), slug.trim_start_matches('/')),
        None => slug.to_string(),
    }
}

#[async_trait]
impl FeedFetcher for RemixFetcher {
    async fn fetch(
        &self,
        url: &str,
        scraper_config: Option<&ScraperConfig>,
        breaker: &CircuitBreaker,
        cancel: &CancellationToken,
    ) -> FetchResult<Vec<FeedItem>> {
        let config = scraper_config.ok_or(FetchError::MissingScraperConfig(SourceType::Remix))?;

        let body = self.http.fetch(url, breaker, cancel).await?;
        let context = extract_remix_context(&body)?;

        let route = select_route(&context, config.context_key.as_deref())
            .ok_or_else(|| FetchError::Parse("no route with loaderData found".to_string()))?;

        let issues = route
            .get("loaderData")
            .unwrap_or(route)
            .get("issues")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut result = Vec::new();
        for issue in issues {
            let title = issue.get("web_title").and_then(Value::as_str).unwrap_or("");
            let slug = issue.get("slug").and_then(Value::as_str).unwrap_or("");
            if title.is_empty() || slug.is_empty() {
                continue;
            }
            let published_at = issue
                .get("override_scheduled_at")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);

            result.push(FeedItem {
                title: title.to_string(),
                url: join_url(config.url_prefix.as_deref(), slug),
                content: String::new(),
                published_at,
            });
        }

        if result.is_empty() {
            return Err(FetchError::EmptyResult);
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "remix"
    }
}
