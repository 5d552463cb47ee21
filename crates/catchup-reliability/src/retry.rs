//! Retry-with-backoff (C2, spec.md §4.2): bounded-attempt wrapper composed
//! on top of the circuit breaker. Composition order used throughout the
//! crawler is `retry(circuit_breaker(do_fetch))`.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::circuit_breaker::{CircuitBreaker, CircuitOpenError};

#[derive(Debug, Clone, Copy)]
pub enum BackoffGrowth {
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub growth: BackoffGrowth,
}

impl RetryConfig {
    pub fn feed_fetch() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            growth: BackoffGrowth::Exponential,
        }
    }

    /// spec.md §4.8: notifier retries are max 2 attempts, base delay 5s,
    /// linear growth.
    pub fn notifier() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(5),
            growth: BackoffGrowth::Linear,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.growth {
            BackoffGrowth::Linear => self.base_delay * (attempt + 1),
            BackoffGrowth::Exponential => self.base_delay * 2u32.saturating_pow(attempt),
        }
    }
}

/// Classifies whether an operation's failure is worth retrying (spec.md
/// §4.2: network errors and HTTP 5xx are retryable; 4xx is not).
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Outcome of a retrying call through a circuit breaker.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Ok(T),
    /// Ran out of attempts; carries the last error observed.
    ExhaustedRetries(E),
    /// The breaker was open on the final admitted attempt — surfaced
    /// immediately rather than retried further (spec.md §4.2: "the retry
    /// wrapper treats a circuit-open as a terminal error").
    CircuitOpen,
    /// Cancelled before any attempt was admitted.
    Cancelled,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn into_result(self) -> Result<T, RetryError<E>> {
        match self {
            RetryOutcome::Ok(v) => Ok(v),
            RetryOutcome::ExhaustedRetries(e) => Err(RetryError::Exhausted(e)),
            RetryOutcome::CircuitOpen => Err(RetryError::CircuitOpen),
            RetryOutcome::Cancelled => Err(RetryError::Cancelled),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("retries exhausted")]
    Exhausted(#[source] E),
    #[error("circuit is open")]
    CircuitOpen,
    #[error("cancelled")]
    Cancelled,
}

/// Run `op` through `breaker`, retrying per `config` on retryable failures.
/// `op` is called fresh on each attempt (it must be re-entrant — callers
/// typically pass a closure capturing a request description, not a
/// half-consumed body).
pub async fn retry_with_breaker<F, Fut, T, E>(
    name: &str,
    config: RetryConfig,
    breaker: &CircuitBreaker,
    cancel: &tokio_util::sync::CancellationToken,
    mut op: F,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Retryable,
{
    let mut last_err = None;
    for attempt in 0..config.max_attempts {
        if cancel.is_cancelled() {
            return RetryOutcome::Cancelled;
        }
        let breaker_result: Result<Result<T, E>, CircuitOpenError> =
            breaker.call(|| op()).await;

        match breaker_result {
            Err(CircuitOpenError) => return RetryOutcome::CircuitOpen,
            Ok(Ok(value)) => return RetryOutcome::Ok(value),
            Ok(Err(e)) => {
                let retryable = e.is_retryable();
                last_err = Some(e);
                if !retryable || attempt + 1 >= config.max_attempts {
                    break;
                }
                let delay = config.delay_for(attempt);
                let jitter = Duration::from_millis(rand::rng().random_range(0..100));
                warn!(
                    op = name,
                    attempt = attempt + 1,
                    delay_ms = (delay + jitter).as_millis() as u64,
                    "retrying after backoff"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay + jitter) => {}
                    _ = cancel.cancelled() => return RetryOutcome::Cancelled,
                }
            }
        }
    }
    match last_err {
        Some(e) => RetryOutcome::ExhaustedRetries(e),
        None => RetryOutcome::Cancelled,
    }
}
