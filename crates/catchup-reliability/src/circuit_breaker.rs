//! Circuit breaker (C2, spec.md §4.2): closed/open/half-open state machine,
//! parameterizable per call site.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Notified on every state transition, so a metrics sink can gauge
/// circuit-breaker state without the reliability crate depending on one
/// (spec.md §4.2: "state transitions MUST be observable").
pub trait BreakerObserver: Send + Sync {
    fn on_transition(&self, name: &str, state: BreakerState);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Tunables for a single breaker instance (spec.md §4.2 parameter presets).
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: f64,
    pub min_requests: u32,
    pub interval: Duration,
    pub open_timeout: Duration,
    pub half_open_max_requests: u32,
}

impl BreakerConfig {
    pub fn feed_fetch() -> Self {
        Self {
            failure_threshold: 0.6,
            min_requests: 5,
            interval: Duration::from_secs(10),
            open_timeout: Duration::from_secs(30),
            half_open_max_requests: 3,
        }
    }
}

/// The distinguished "circuit open" outcome (spec.md §4.2): no call is made,
/// rejected immediately. Treated as non-retryable by the retry wrapper.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("circuit is open")]
pub struct CircuitOpenError;

struct Counters {
    successes: u32,
    failures: u32,
    window_started_at: Instant,
}

struct Inner {
    state: BreakerState,
    opened_at: Option<Instant>,
    half_open_inflight: u32,
    half_open_seen_failure: bool,
    counters: Counters,
}

/// A single named circuit breaker instance. `name` is attached to every log
/// line and state transition for correlation (one instance per call site —
/// e.g. one per notifier channel).
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
    transitions: AtomicU64,
    current_state: AtomicU32,
    observer: Option<Arc<dyn BreakerObserver>>,
}

const STATE_CLOSED: u32 = 0;
const STATE_OPEN: u32 = 1;
const STATE_HALF_OPEN: u32 = 2;

fn encode(state: BreakerState) -> u32 {
    match state {
        BreakerState::Closed => STATE_CLOSED,
        BreakerState::Open => STATE_OPEN,
        BreakerState::HalfOpen => STATE_HALF_OPEN,
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                opened_at: None,
                half_open_inflight: 0,
                half_open_seen_failure: false,
                counters: Counters {
                    successes: 0,
                    failures: 0,
                    window_started_at: Instant::now(),
                },
            }),
            transitions: AtomicU64::new(0),
            current_state: AtomicU32::new(STATE_CLOSED),
            observer: None,
        }
    }

    /// Attaches a metrics observer, notified on every state transition.
    pub fn with_observer(mut self, observer: Arc<dyn BreakerObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn state(&self) -> BreakerState {
        match self.current_state.load(Ordering::Relaxed) {
            STATE_OPEN => BreakerState::Open,
            STATE_HALF_OPEN => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }

    /// Total number of state transitions observed; exposed as a gauge/counter
    /// source for C10 observability.
    pub fn transition_count(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }

    /// Run `f` through the breaker. Returns `Err(CircuitOpenError)` without
    /// invoking `f` at all when the breaker is open or the half-open trial
    /// budget is exhausted.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<Result<T, E>, CircuitOpenError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.admit() {
            return Err(CircuitOpenError);
        }
        let result = f().await;
        self.record(result.is_ok());
        Ok(result)
    }

    /// Decide whether a call may proceed, transitioning `open` → `half-open`
    /// when the timeout has elapsed and reserving a half-open trial slot.
    fn admit(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.state {
            BreakerState::Closed => {
                self.maybe_reset_window(&mut inner);
                true
            }
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.open_timeout {
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    inner.half_open_inflight = 1;
                    inner.half_open_seen_failure = false;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.half_open_inflight < self.config.half_open_max_requests {
                    inner.half_open_inflight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record(&self, success: bool) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.state {
            BreakerState::Closed => {
                if success {
                    inner.counters.successes += 1;
                } else {
                    inner.counters.failures += 1;
                }
                let total = inner.counters.successes + inner.counters.failures;
                if total >= self.config.min_requests {
                    let ratio = inner.counters.failures as f64 / total as f64;
                    if ratio >= self.config.failure_threshold {
                        self.transition(&mut inner, BreakerState::Open);
                        inner.opened_at = Some(Instant::now());
                    }
                }
            }
            BreakerState::HalfOpen => {
                inner.half_open_inflight = inner.half_open_inflight.saturating_sub(1);
                if !success {
                    inner.half_open_seen_failure = true;
                }
                if inner.half_open_inflight == 0 {
                    if inner.half_open_seen_failure {
                        self.transition(&mut inner, BreakerState::Open);
                        inner.opened_at = Some(Instant::now());
                    } else {
                        self.transition(&mut inner, BreakerState::Closed);
                        inner.counters = Counters {
                            successes: 0,
                            failures: 0,
                            window_started_at: Instant::now(),
                        };
                    }
                }
            }
            BreakerState::Open => {
                // A call shouldn't be recorded while open (admit() rejects
                // them), but ignore defensively rather than panic.
            }
        }
    }

    fn maybe_reset_window(&self, inner: &mut Inner) {
        if inner.counters.window_started_at.elapsed() >= self.config.interval {
            inner.counters = Counters {
                successes: 0,
                failures: 0,
                window_started_at: Instant::now(),
            };
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState) {
        if inner.state == to {
            return;
        }
        let from = inner.state;
        inner.state = to;
        self.current_state.store(encode(to), Ordering::Relaxed);
        self.transitions.fetch_add(1, Ordering::Relaxed);
        match to {
            BreakerState::Open => warn!(breaker = %self.name, %from, %to, "circuit breaker tripped open"),
            _ => info!(breaker = %self.name, %from, %to, "circuit breaker transition"),
        }
        if let Some(observer) = &self.observer {
            observer.on_transition(&self.name, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 0.5,
            min_requests: 2,
            interval: Duration::from_secs(60),
            open_timeout: Duration::from_millis(50),
            half_open_max_requests: 2,
        }
    }

    #[tokio::test]
    async fn starts_closed_and_allows_calls() {
        let cb = CircuitBreaker::new("test", test_config());
        let result = cb.call(|| async { Ok::<_, ()>(1) }).await;
        assert!(matches!(result, Ok(Ok(1))));
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn trips_open_after_failure_ratio_exceeded() {
        let cb = CircuitBreaker::new("test", test_config());
        let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(cb.state(), BreakerState::Open);

        let rejected = cb.call(|| async { Ok::<_, &str>(()) }).await;
        assert!(rejected.is_err());
    }

    #[tokio::test]
    async fn half_open_success_closes_and_failure_reopens() {
        let cb = CircuitBreaker::new("test", test_config());
        let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(cb.state(), BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let result = cb.call(|| async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Ok(Ok(()))));
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_circuit() {
        let cb = CircuitBreaker::new("test", test_config());
        let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        let result = cb.call(|| async { Err::<(), _>("still broken") }).await;
        assert!(matches!(result, Ok(Err(_))));
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn half_open_limits_concurrent_trial_calls() {
        let cb = CircuitBreaker::new("test", test_config());
        let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        // half_open_max_requests = 2: admit two, reject the third before any
        // complete.
        assert!(cb.admit());
        assert!(cb.admit());
        assert!(!cb.admit());
    }
}
