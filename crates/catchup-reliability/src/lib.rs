//! Reliability primitives (C2, spec.md §4.2): circuit breaker,
//! retry-with-backoff, and token-bucket rate limiting. Parameterizable per
//! call site and composed by every other crate that talks to the network.

pub mod circuit_breaker;
pub mod rate_limit;
pub mod retry;

pub use circuit_breaker::{BreakerConfig, BreakerObserver, BreakerState, CircuitBreaker, CircuitOpenError};
pub use rate_limit::RateLimiter;
pub use retry::{retry_with_breaker, BackoffGrowth, RetryConfig, RetryError, RetryOutcome, Retryable};
