//! Next.js adapter (spec.md §4.3): extract `<script id="__NEXT_DATA__">`,
//! parse as JSON, navigate `props.pageProps.{data_key|"initialSeedData"}.items[]`.

use async_trait::async_trait;
use catchup_core::{FeedItem, ScraperConfig, SourceType};
use catchup_reliability::CircuitBreaker;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, FetchResult};
use crate::fetcher::FeedFetcher;
use crate::http_phase::HttpPhase;

pub struct NextJsFetcher {
    http: HttpPhase,
}

impl NextJsFetcher {
    pub fn new(http: HttpPhase) -> Self {
        Self { http }
    }
}

fn extract_next_data(html: &str) -> FetchResult<Value> {
    let re = Regex::new(
        r#"(?s)<script id="__NEXT_DATA__"[^>]*>(.*?)</script>"#,
    )
    .expect("valid regex");
    let captured = re
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or_else(|| FetchError::Parse("__NEXT_DATA__ script not found".to_string()))?;
    serde_json::from_str(captured.as_str().trim())
        .map_err(|e| FetchError::Parse(e.to_string()))
}

fn parse_published_at(raw: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return DateTime::from_naive_utc_and_offset(dt, Utc);
        }
    }
    Utc::now()
}

fn join_url(prefix: Option<&str>, slug: &str) -> String {
    match prefix {
        Some(p) => format!("{}/{}", p.trim_end_matches('/'), slug.trim_start_matches('/')),
        None => slug.to_string(),
    }
}

#[async_trait]
impl FeedFetcher for NextJsFetcher {
    async fn fetch(
        &self,
        url: &str,
        scraper_config: Option<&ScraperConfig>,
        breaker: &CircuitBreaker,
        cancel: &CancellationToken,
    ) -> FetchResult<Vec<FeedItem>> {
        let config = scraper_config
            .ok_or(FetchError::MissingScraperConfig(SourceType::NextJs))?;

        let body = self.http.fetch(url, breaker, cancel).await?;
        let data = extract_next_data(&body)?;

        let data_key = config.data_key.as_deref().unwrap_or("initialSeedData");
        let items = data
            .pointer("/props/pageProps")
            .and_then(|p| p.get(data_key))
            .and_then(|d| d.get("items"))
            .and_then(|i| i.as_array())
            .cloned()
            .unwrap_or_default();

        let mut result = Vec::new();
        for item in items {
            let title = item.get("title").and_then(Value::as_str).unwrap_or("");
            let slug = item.get("slug").and_then(Value::as_str).unwrap_or("");
            if title.is_empty() || slug.is_empty() {
                continue;
            }
            let published_at = item
                .get("publishedOn")
                .and_then(Value::as_str)
                .map(parse_published_at)
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
        "nextjs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_next_data_script() {
        let html = r#"<html><body><script id="__NEXT_DATA__" type="application/json">{"props":{"pageProps":{"initialSeedData":{"items":[{"title":"A","slug":"a","publishedOn":"2026-01-01T00:00:00Z"}]}}}}</script></body></html>"#;
        let data = extract_next_data(html).unwrap();
        let items = data
            .pointer("/props/pageProps/initialSeedData/items")
            .unwrap()
            .as_array()
            .unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn missing_script_is_an_error() {
        assert!(extract_next_data("<html></html>").is_err());
    }

    #[test]
    fn join_url_prefixes_slug() {
        assert_eq!(join_url(Some("https://x.com/blog"), "/my-post"), "https://x.com/blog/my-post");
    }
}
