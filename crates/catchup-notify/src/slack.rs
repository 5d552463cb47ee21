use async_trait::async_trait;
use catchup_core::Article;
use serde_json::json;

use crate::backend::NotifyBackend;
use crate::error::{NotifyError, NotifyResult};
use crate::retry_after::parse_retry_after;

const TEXT_MAX: usize = 3000;

pub struct SlackWebhook {
    webhook_url: String,
    http: reqwest::Client,
}

impl SlackWebhook {
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
impl NotifyBackend for SlackWebhook {
    async fn send(&self, article: &Article, request_id: &str) -> NotifyResult<()> {
        let text = format!("*<{}|{}>*\n{}", article.url, article.title, article.summary);
        let payload = json!({
            "text": Self::truncate(&text, TEXT_MAX),
            "unfurl_links": false,
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
        "slack"
    }
}
