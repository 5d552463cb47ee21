use async_trait::async_trait;
use catchup_core::Article;
use serde_json::json;

use crate::backend::NotifyBackend;
use crate::error::{NotifyError, NotifyResult};
use crate::retry_after::parse_retry_after;

/// Discord field/description limits the payload truncates to (spec.md §4.8:
/// "field truncation obey published channel limits").
const TITLE_MAX: usize = 256;
const DESCRIPTION_MAX: usize = 4096;

pub struct DiscordWebhook {
    webhook_url: String,
    http: reqwest::Client,
}

impl DiscordWebhook {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            http: reqwest::Client::new(),
        }
    }

    fn truncate(s: &str, max: usize) -> String {
        if s.chars().count() <= max {
            s.to_string()
        } else {
            s.chars().take(max.saturating_sub(1)).collect::<String>() + "…"
        }
    }
}

#[async_trait]
impl NotifyBackend for DiscordWebhook {
    async fn send(&self, article: &Article, request_id: &str) -> NotifyResult<()> {
        let payload = json!({
            "embeds": [{
                "title": Self::truncate(&article.title, TITLE_MAX),
                "description": Self::truncate(&article.summary, DESCRIPTION_MAX),
                "url": article.url,
            }],
        });

        let response = self
            .http
            .post(&self.webhook_url)
            .header("X-Request-Id", request_id)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let headers = response.headers().clone();
            let body = response.json::<serde_json::Value>().await.ok();
            let json_field = body.as_ref().and_then(|b| b.get("retry_after"));
            let retry_after = parse_retry_after(&headers, json_field);
            return Err(NotifyError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(NotifyError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "discord"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_strings_untouched() {
        assert_eq!(DiscordWebhook::truncate("short", 256), "short");
    }

    #[test]
    fn truncate_caps_long_strings_with_ellipsis() {
        let long = "a".repeat(300);
        let truncated = DiscordWebhook::truncate(&long, 256);
        assert_eq!(truncated.chars().count(), 256);
        assert!(truncated.ends_with('…'));
    }
}
