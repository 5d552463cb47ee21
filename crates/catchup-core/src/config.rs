//! Two-layer configuration: [`EnvConfig`] for secrets/per-deployment values
//! (env vars), [`CrawlConfig`] for durable tunables (TOML file). See
//! SPEC_FULL.md §12.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

fn required_env(key: &str) -> ConfigResult<String> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnv(key.to_string()))
}

/// Parse a positive duration-seconds env var, falling back to `default` on
/// anything unparseable or non-positive (spec.md §6 DB pool config rule,
/// applied generally since several knobs share this contract).
fn env_duration_secs_or(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_u32_or(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|n| *n > 0)
        .map(|n| n as u32)
        .unwrap_or(default)
}

/// Secrets and per-deployment values, loaded once at process start
/// (`rootsignal-core::config::AppConfig`'s shape).
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub database_url: String,
    pub ai_grpc_address: String,
    pub ai_enabled: bool,
    pub db_pool: DbPoolConfig,
    pub notifier_webhooks: NotifierWebhooks,
}

/// `DB_MAX_OPEN_CONNS` / `DB_MAX_IDLE_CONNS` / `DB_CONN_MAX_LIFETIME` /
/// `DB_CONN_MAX_IDLE_TIME` (spec.md §6). Non-positive or unparseable values
/// fall back to the documented defaults.
#[derive(Debug, Clone, Copy)]
pub struct DbPoolConfig {
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub conn_max_lifetime: Duration,
    pub conn_max_idle_time: Duration,
}

impl DbPoolConfig {
    pub fn from_env() -> Self {
        Self {
            max_open_conns: env_u32_or("DB_MAX_OPEN_CONNS", 25),
            max_idle_conns: env_u32_or("DB_MAX_IDLE_CONNS", 10),
            conn_max_lifetime: env_duration_secs_or("DB_CONN_MAX_LIFETIME", Duration::from_secs(3600)),
            conn_max_idle_time: env_duration_secs_or("DB_CONN_MAX_IDLE_TIME", Duration::from_secs(1800)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotifierWebhooks {
    pub discord: Option<String>,
    pub slack: Option<String>,
}

impl NotifierWebhooks {
    fn from_env() -> Self {
        Self {
            discord: std::env::var("DISCORD_WEBHOOK_URL").ok(),
            slack: std::env::var("SLACK_WEBHOOK_URL").ok(),
        }
    }
}

impl EnvConfig {
    pub fn from_env() -> ConfigResult<Self> {
        dotenvy::dotenv().ok();

        let ai_enabled = std::env::var("AI_ENABLED")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(true);

        Ok(Self {
            database_url: required_env("DATABASE_URL")?,
            ai_grpc_address: std::env::var("AI_GRPC_ADDRESS")
                .unwrap_or_else(|_| "localhost:50051".to_string()),
            ai_enabled,
            db_pool: DbPoolConfig::from_env(),
            notifier_webhooks: NotifierWebhooks::from_env(),
        })
    }
}

/// Circuit breaker parameters (spec.md §4.2). One set per call site
/// ("feed fetch", "AI client", "notifier").
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CircuitBreakerPreset {
    pub failure_threshold: f64,
    pub min_requests: u32,
    pub interval: DurationSecs,
    pub open_timeout: DurationSecs,
    pub half_open_max_requests: u32,
}

impl CircuitBreakerPreset {
    /// Feed fetch preset (spec.md §4.2): failure ratio 0.6, min 5 requests,
    /// interval 10s, open-timeout 30s, half-open max 3.
    pub fn feed_fetch() -> Self {
        Self {
            failure_threshold: 0.6,
            min_requests: 5,
            interval: DurationSecs(Duration::from_secs(10)),
            open_timeout: DurationSecs(Duration::from_secs(30)),
            half_open_max_requests: 3,
        }
    }

    /// AI client preset: same shape as feed fetch; thresholds carried in
    /// configuration (spec.md §4.2).
    pub fn ai_client() -> Self {
        Self::feed_fetch()
    }

    /// One instance per notifier channel; same shape (spec.md §4.2).
    pub fn notifier() -> Self {
        Self::feed_fetch()
    }
}

/// Wrapper so plain-integer-seconds TOML values deserialize into
/// `std::time::Duration` without a third-party serde-duration crate.
#[derive(Debug, Clone, Copy)]
pub struct DurationSecs(pub Duration);

impl<'de> Deserialize<'de> for DurationSecs {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(DurationSecs(Duration::from_secs(secs)))
    }
}

/// Retry-with-backoff parameters (spec.md §4.2).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryPreset {
    pub max_attempts: u32,
    pub base_delay: DurationSecs,
    pub exponential: bool,
}

impl RetryPreset {
    pub fn feed_fetch() -> Self {
        Self {
            max_attempts: 3,
            base_delay: DurationSecs(Duration::from_millis(500)),
            exponential: true,
        }
    }

    /// Notifier: max 2 attempts, base delay 5s, linear growth (spec.md §4.8).
    pub fn notifier() -> Self {
        Self {
            max_attempts: 2,
            base_delay: DurationSecs(Duration::from_secs(5)),
            exponential: false,
        }
    }
}

/// AI service method-level knobs (spec.md §6), with the validation bounds
/// spec.md enforces at load time.
#[derive(Debug, Clone, Deserialize)]
pub struct AiServiceConfig {
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: DurationSecs,
    #[serde(default = "default_timeouts")]
    pub timeouts: AiTimeouts,
    #[serde(default = "default_search_config")]
    pub search: AiSearchConfig,
    #[serde(default = "CircuitBreakerPreset::ai_client")]
    pub circuit_breaker: CircuitBreakerPreset,
}

fn default_connection_timeout() -> DurationSecs {
    DurationSecs(Duration::from_secs(5))
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AiTimeouts {
    #[serde(default = "default_embed_timeout")]
    pub embed: DurationSecs,
    #[serde(default = "default_search_timeout")]
    pub search: DurationSecs,
    #[serde(default = "default_query_timeout")]
    pub query: DurationSecs,
    #[serde(default = "default_summary_timeout")]
    pub summary: DurationSecs,
}

fn default_embed_timeout() -> DurationSecs {
    DurationSecs(Duration::from_secs(30))
}
fn default_search_timeout() -> DurationSecs {
    DurationSecs(Duration::from_secs(30))
}
fn default_query_timeout() -> DurationSecs {
    DurationSecs(Duration::from_secs(60))
}
fn default_summary_timeout() -> DurationSecs {
    DurationSecs(Duration::from_secs(120))
}

fn default_timeouts() -> AiTimeouts {
    AiTimeouts {
        embed: default_embed_timeout(),
        search: default_search_timeout(),
        query: default_query_timeout(),
        summary: default_summary_timeout(),
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AiSearchConfig {
    pub default_limit: u32,
    pub max_limit: u32,
    pub default_min_similarity: f64,
    pub default_max_context: u32,
    pub max_context: u32,
}

fn default_search_config() -> AiSearchConfig {
    AiSearchConfig {
        default_limit: 10,
        max_limit: 50,
        default_min_similarity: 0.7,
        default_max_context: 5,
        max_context: 20,
    }
}

impl AiServiceConfig {
    /// Validation bounds enforced at load (spec.md §6):
    /// addresses non-empty, all durations positive,
    /// `default_limit ∈ [1, max_limit]`, `max_limit ∈ [1,100]`,
    /// `min_similarity ∈ [0,1]`, `max_context ∈ [1,50]`.
    pub fn validate(&self, grpc_address: &str) -> ConfigResult<()> {
        if grpc_address.trim().is_empty() {
            return Err(ConfigError::Invalid("grpc_address must be non-empty".into()));
        }
        for (name, d) in [
            ("connection_timeout", self.connection_timeout.0),
            ("timeouts.embed", self.timeouts.embed.0),
            ("timeouts.search", self.timeouts.search.0),
            ("timeouts.query", self.timeouts.query.0),
            ("timeouts.summary", self.timeouts.summary.0),
        ] {
            if d.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        let s = &self.search;
        if !(1..=s.max_limit).contains(&s.default_limit) {
            return Err(ConfigError::Invalid(
                "search.default_limit must be in [1, max_limit]".into(),
            ));
        }
        if !(1..=100).contains(&s.max_limit) {
            return Err(ConfigError::Invalid("search.max_limit must be in [1,100]".into()));
        }
        if !(0.0..=1.0).contains(&s.default_min_similarity) {
            return Err(ConfigError::Invalid(
                "search.default_min_similarity must be in [0,1]".into(),
            ));
        }
        if !(1..=50).contains(&s.max_context) {
            return Err(ConfigError::Invalid("search.max_context must be in [1,50]".into()));
        }
        Ok(())
    }
}

/// `security.auth.*` / `security.jwt.*` / `security.public_endpoints` kept
/// for parity with the teacher's multi-surface config file even though HTTP
/// auth is not part of this crate's scope — nothing reads these yet, but a
/// future admin HTTP surface would.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub public_endpoints: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JwtConfig {
    pub issuer: Option<String>,
}

/// Durable tunables loaded from a TOML file (spec.md §12).
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    #[serde(default = "default_content_slot_capacity")]
    pub content_slot_capacity: usize,
    #[serde(default = "default_summary_slot_capacity")]
    pub summary_slot_capacity: usize,
    #[serde(default = "default_content_threshold")]
    pub content_enhance_threshold: usize,
    #[serde(default = "CircuitBreakerPreset::feed_fetch")]
    pub feed_fetch_breaker: CircuitBreakerPreset,
    #[serde(default = "RetryPreset::feed_fetch")]
    pub feed_fetch_retry: RetryPreset,
    #[serde(default = "CircuitBreakerPreset::notifier")]
    pub notifier_breaker: CircuitBreakerPreset,
    #[serde(default = "RetryPreset::notifier")]
    pub notifier_retry: RetryPreset,
    pub ai_service: AiServiceConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

fn default_content_slot_capacity() -> usize {
    10
}
fn default_summary_slot_capacity() -> usize {
    5
}
fn default_content_threshold() -> usize {
    1500
}

impl CrawlConfig {
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        toml::from_str(s).map_err(|e| ConfigError::ParseFile {
            path: "<string>".to_string(),
            source: e,
        })
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFile {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn validate(&self, grpc_address: &str) -> ConfigResult<()> {
        if self.summary_slot_capacity == 0 || self.content_slot_capacity == 0 {
            return Err(ConfigError::Invalid(
                "slot capacities must be positive".into(),
            ));
        }
        self.ai_service.validate(grpc_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_pool_falls_back_on_unparseable_env() {
        std::env::remove_var("DB_MAX_OPEN_CONNS");
        let cfg = DbPoolConfig::from_env();
        assert_eq!(cfg.max_open_conns, 25);
        assert_eq!(cfg.max_idle_conns, 10);
    }

    #[test]
    fn ai_service_config_rejects_out_of_bound_limits() {
        let mut cfg = default_search_config();
        cfg.max_limit = 500;
        let ai = AiServiceConfig {
            connection_timeout: default_connection_timeout(),
            timeouts: default_timeouts(),
            search: cfg,
            circuit_breaker: CircuitBreakerPreset::ai_client(),
        };
        assert!(ai.validate("localhost:50051").is_err());
    }

    #[test]
    fn ai_service_config_rejects_empty_address() {
        let ai = AiServiceConfig {
            connection_timeout: default_connection_timeout(),
            timeouts: default_timeouts(),
            search: default_search_config(),
            circuit_breaker: CircuitBreakerPreset::ai_client(),
        };
        assert!(ai.validate("").is_err());
        assert!(ai.validate("localhost:50051").is_ok());
    }

    #[test]
    fn crawl_config_parses_minimal_toml() {
        let toml = r#"
            [ai_service]
            [ai_service.search]
            default_limit = 10
            max_limit = 50
            default_min_similarity = 0.7
            default_max_context = 5
            max_context = 20
        "#;
        let cfg = CrawlConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(cfg.content_slot_capacity, 10);
        assert_eq!(cfg.summary_slot_capacity, 5);
        assert!(cfg.validate("localhost:50051").is_ok());
    }
}
