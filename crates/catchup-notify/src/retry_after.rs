//! Reads the server-advised retry-after duration: a structured JSON field or
//! the `Retry-After` header, default 5s (spec.md §4.8).

use std::time::Duration;

use reqwest::header::HeaderMap;

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

pub fn parse_retry_after(headers: &HeaderMap, json_field: Option<&serde_json::Value>) -> Duration {
    if let Some(value) = json_field {
        if let Some(secs) = value.as_f64() {
            return Duration::from_secs_f64(secs.max(0.0));
        }
    }
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<f64>().ok())
        .map(|secs| Duration::from_secs_f64(secs.max(0.0)))
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_five_seconds_when_absent() {
        let headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers, None), Duration::from_secs(5));
    }

    #[test]
    fn reads_retry_after_header() {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "12".parse().unwrap());
        assert_eq!(parse_retry_after(&headers, None), Duration::from_secs(12));
    }

    #[test]
    fn prefers_structured_json_field_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "12".parse().unwrap());
        let json = serde_json::json!(3.5);
        assert_eq!(
            parse_retry_after(&headers, Some(&json)),
            Duration::from_secs_f64(3.5)
        );
    }
}
