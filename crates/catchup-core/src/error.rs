//! Typed errors for URL safety and configuration loading.

use thiserror::Error;

/// Reasons the URL Safety Gate (C1) can reject a URL (spec.md §4.1).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("malformed URL: {0}")]
    Malformed(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("DNS resolution failed for {host}: {reason}")]
    DnsFailure { host: String, reason: String },

    #[error("URL resolves to a private/loopback/link-local address: {0}")]
    PrivateAddress(String),

    #[error("URL exceeds the {max} byte length cap")]
    TooLong { max: usize },
}

pub type SecurityResult<T> = Result<T, SecurityError>;

/// Configuration-invalid errors are fatal at startup (spec.md §7).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("invalid environment variable {name}: {reason}")]
    InvalidEnv { name: String, reason: String },

    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
