//! Content Enhancer (C4, spec.md §4.4). The enhancer fetches full-page text;
//! the *policy* of when to use it belongs to the orchestrator, not here —
//! this module only provides the optional extractor and the policy function
//! it applies, kept together since both are thin.

use async_trait::async_trait;
use catchup_reliability::CircuitBreaker;
use tokio_util::sync::CancellationToken;

use crate::error::FetchResult;
use crate::http_phase::HttpPhase;

/// Default feed-body length under which enhancement is attempted (spec.md
/// §4.4).
pub const DEFAULT_THRESHOLD: usize = 1500;

#[async_trait]
pub trait ContentEnhancer: Send + Sync {
    async fn fetch_full_text(
        &self,
        url: &str,
        breaker: &CircuitBreaker,
        cancel: &CancellationToken,
    ) -> FetchResult<String>;
}

/// HTML-to-text enhancer: same HTTP phase (gate + size cap) as fetcher
/// adapters (spec.md §4.4: "the enhancer itself is subject to the same URL
/// Safety Gate and size cap as fetcher adapters"), with tags stripped.
pub struct HtmlContentEnhancer {
    http: HttpPhase,
}

impl HtmlContentEnhancer {
    pub fn new(http: HttpPhase) -> Self {
        Self { http }
    }

    fn strip_tags(html: &str) -> String {
        let tag = regex::Regex::new(r"(?s)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>|<[^>]+>")
            .expect("valid regex");
        let text = tag.replace_all(html, " ");
        let collapsed = regex::Regex::new(r"\s+").expect("valid regex");
        collapsed.replace_all(text.trim(), " ").into_owned()
    }
}

#[async_trait]
impl ContentEnhancer for HtmlContentEnhancer {
    async fn fetch_full_text(
        &self,
        url: &str,
        breaker: &CircuitBreaker,
        cancel: &CancellationToken,
    ) -> FetchResult<String> {
        let html = self.http.fetch(url, breaker, cancel).await?;
        Ok(Self::strip_tags(&html))
    }
}

/// Outcome of applying the enhancer policy to one item, carrying the text to
/// use plus which `CrawlStats` counter the caller should increment.
pub enum EnhanceOutcome {
    Skipped(String),
    Success(String),
    Failed(String),
}

/// spec.md §4.4 policy, applied by the orchestrator:
/// - no enhancer → feed body.
/// - `len(feed_body) ≥ threshold` → feed body, counted `skipped`.
/// - else attempt enhancement; error → fall back, counted `failed`.
/// - success → use enhanced text only if strictly longer than feed body.
pub async fn apply_policy(
    enhancer: Option<&(dyn ContentEnhancer)>,
    feed_body: &str,
    url: &str,
    threshold: usize,
    breaker: &CircuitBreaker,
    cancel: &CancellationToken,
) -> EnhanceOutcome {
    let Some(enhancer) = enhancer else {
        return EnhanceOutcome::Skipped(feed_body.to_string());
    };
    if feed_body.len() >= threshold {
        return EnhanceOutcome::Skipped(feed_body.to_string());
    }
    match enhancer.fetch_full_text(url, breaker, cancel).await {
        Ok(enhanced) if enhanced.len() > feed_body.len() => EnhanceOutcome::Success(enhanced),
        Ok(_) => EnhanceOutcome::Success(feed_body.to_string()),
        Err(_) => EnhanceOutcome::Failed(feed_body.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_tags_removes_scripts_and_markup() {
        let html = "<html><head><script>evil()</script></head><body><p>Hello <b>World</b></p></body></html>";
        let text = HtmlContentEnhancer::strip_tags(html);
        assert_eq!(text, "Hello World");
    }

    struct StubEnhancer(Option<String>);

    #[async_trait]
    impl ContentEnhancer for StubEnhancer {
        async fn fetch_full_text(
            &self,
            _url: &str,
            _breaker: &CircuitBreaker,
            _cancel: &CancellationToken,
        ) -> FetchResult<String> {
            match &self.0 {
                Some(s) => Ok(s.clone()),
                None => Err(crate::error::FetchError::EmptyResult),
            }
        }
    }

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("test", catchup_reliability::BreakerConfig::feed_fetch())
    }

    #[tokio::test]
    async fn skips_when_feed_body_meets_threshold() {
        let enhancer = StubEnhancer(Some("ignored".to_string()));
        let long_body = "x".repeat(2000);
        let cancel = CancellationToken::new();
        let outcome = apply_policy(
            Some(&enhancer),
            &long_body,
            "https://example.com",
            DEFAULT_THRESHOLD,
            &breaker(),
            &cancel,
        )
        .await;
        assert!(matches!(outcome, EnhanceOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn uses_enhanced_text_only_when_strictly_longer() {
        let enhancer = StubEnhancer(Some("short".to_string()));
        let cancel = CancellationToken::new();
        let outcome = apply_policy(
            Some(&enhancer),
            "a longer feed body than enhanced",
            "https://example.com",
            DEFAULT_THRESHOLD,
            &breaker(),
            &cancel,
        )
        .await;
        match outcome {
            EnhanceOutcome::Success(text) => assert_eq!(text, "a longer feed body than enhanced"),
            _ => panic!("expected Success"),
        }
    }

    #[tokio::test]
    async fn falls_back_to_feed_body_on_enhancer_error() {
        let enhancer = StubEnhancer(None);
        let cancel = CancellationToken::new();
        let outcome = apply_policy(
            Some(&enhancer),
            "feed body",
            "https://example.com",
            DEFAULT_THRESHOLD,
            &breaker(),
            &cancel,
        )
        .await;
        match outcome {
            EnhanceOutcome::Failed(text) => assert_eq!(text, "feed body"),
            _ => panic!("expected Failed"),
        }
    }
}
