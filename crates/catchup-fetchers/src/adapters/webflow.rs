//! Webflow-HTML adapter (spec.md §4.3): iterate items matching
//! `item_selector`; per item extract title/url/date via their own
//! selectors, date via `date_format` with small fallbacks.

use async_trait::async_trait;
use catchup_core::{FeedItem, ScraperConfig, SourceType};
use catchup_reliability::CircuitBreaker;
use chrono::{DateTime, NaiveDate, Utc};
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, FetchResult};
use crate::fetcher::FeedFetcher;
use crate::http_phase::HttpPhase;

pub struct WebflowFetcher {
    http: HttpPhase,
}

impl WebflowFetcher {
    pub fn new(http: HttpPhase) -> Self {
        Self { http }
    }
}

fn parse_selector(expr: &str) -> FetchResult<Selector> {
    Selector::parse(expr).map_err(|e| FetchError::Parse(format!("invalid selector {expr}: {e:?}")))
}

fn join_url(prefix: Option<&str>, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    match prefix {
        Some(p) => format!("{}/{}", p.trim_end_matches('/'), href.trim_start_matches('/')),
        None => href.to_string(),
    }
}

/// Parse `raw` with `date_format` first, then a small set of common
/// fallback patterns, defaulting to "now" when all fail (spec.md §4.3).
fn parse_date(raw: &str, date_format: Option<&str>) -> DateTime<Utc> {
    let raw = raw.trim();
    let formats: Vec<&str> = date_format
        .into_iter()
        .chain(["%Y-%m-%d", "%B %d, %Y", "%d %B %Y", "%m/%d/%Y"])
        .collect();

    for fmt in formats {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return dt.with_timezone(&Utc);
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return DateTime::from_naive_utc_and_offset(dt, Utc);
            }
        }
    }
    Utc::now()
}

#[async_trait]
impl FeedFetcher for WebflowFetcher {
    async fn fetch(
        &self,
        url: &str,
        scraper_config: Option<&ScraperConfig>,
        breaker: &CircuitBreaker,
        cancel: &CancellationToken,
    ) -> FetchResult<Vec<FeedItem>> {
        let config = scraper_config
            .ok_or(FetchError::MissingScraperConfig(SourceType::Webflow))?;
        if !config.has_webflow_fields() {
            return Err(FetchError::MissingScraperConfig(SourceType::Webflow));
        }

        let body = self.http.fetch(url, breaker, cancel).await?;
        let document = Html::parse_document(&body);

        let item_sel = parse_selector(config.item_selector.as_deref().unwrap())?;
        let title_sel = parse_selector(config.title_selector.as_deref().unwrap())?;
        let date_sel = parse_selector(config.date_selector.as_deref().unwrap())?;
        let url_sel = parse_selector(config.url_selector.as_deref().unwrap())?;

        let mut items = Vec::new();
        for element in document.select(&item_sel) {
            let title: String = element
                .select(&title_sel)
                .next()
                .map(|e| e.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            if title.is_empty() {
                continue;
            }

            let href = element
                .select(&url_sel)
                .next()
                .and_then(|e| e.value().attr("href"))
                .unwrap_or("");
            if href.is_empty() {
                continue;
            }

            let date_text = element
                .select(&date_sel)
                .next()
                .map(|e| e.text().collect::<String>())
                .unwrap_or_default();
            let published_at = parse_date(&date_text, config.date_format.as_deref());

            items.push(FeedItem {
                title,
                url: join_url(config.url_prefix.as_deref(), href),
                content: String::new(),
                published_at,
            });
        }

        if items.is_empty() {
            return Err(FetchError::EmptyResult);
        }
        Ok(items)
    }

    fn name(&self) -> &str {
        "webflow"
    }
}
