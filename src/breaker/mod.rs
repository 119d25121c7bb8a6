//! Per-dependency circuit breakers.
//!
//! Each flaky external service (exchange API, news feed, backtest engine) gets
//! one breaker instance, looked up by dependency key through the registry so
//! every caller in the process shares failure state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

/// State machine: closed → open after N consecutive failures; open → half_open
/// once the reset timeout elapses; half_open → closed on success, back to open
/// on any failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
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

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long an open breaker waits before allowing a trial call.
    pub reset_timeout: Duration,
    /// Concurrent trial calls allowed while half-open.
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_max_calls: 1,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    half_open_calls: u32,
}

/// One circuit breaker. Counters are lock-protected since multiple workers
/// may hit the same dependency concurrently.
pub struct CircuitBreaker {
    key: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(key: &str, config: BreakerConfig) -> Self {
        Self {
            key: key.to_string(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
                half_open_calls: 0,
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether a call may proceed. Side-effecting: flips open → half_open once
    /// the reset timeout has elapsed, and counts half-open trial calls against
    /// the budget.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|t| t.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if elapsed {
                    info!(breaker = %self.key, "Reset timeout elapsed, entering half-open");
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_calls = 1;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.half_open_calls < self.config.half_open_max_calls {
                    inner.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Report a successful call: clears the failure count and closes.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != BreakerState::Closed {
            info!(breaker = %self.key, "Closing after successful call");
        }
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.half_open_calls = 0;
    }

    /// Report a failed call. Opens from closed once the threshold is reached,
    /// and immediately reopens from half-open.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        match inner.state {
            BreakerState::HalfOpen => {
                warn!(breaker = %self.key, "Trial call failed, reopening");
                inner.state = BreakerState::Open;
                inner.half_open_calls = 0;
            }
            BreakerState::Closed if inner.failure_count >= self.config.failure_threshold => {
                warn!(
                    breaker = %self.key,
                    failures = inner.failure_count,
                    "Failure threshold reached, opening"
                );
                inner.state = BreakerState::Open;
            }
            _ => {}
        }
    }

    /// Manual override back to closed, clearing counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.half_open_calls = 0;
        inner.last_failure = None;
        info!(breaker = %self.key, "Manually reset");
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().unwrap();
        BreakerSnapshot {
            key: self.key.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.config.failure_threshold,
            reset_timeout_seconds: self.config.reset_timeout.as_secs_f64(),
        }
    }
}

/// Point-in-time view of a breaker, for the API and CLI.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub key: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub reset_timeout_seconds: f64,
}

/// Lazily-populated registry of breakers, one per dependency key.
///
/// The lock guards creation only; each breaker synchronizes its own counters.
pub struct BreakerRegistry {
    default_config: BreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(default_config: BreakerConfig) -> Self {
        Self {
            default_config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Get the breaker for a dependency, creating it on first use.
    pub fn get_or_create(&self, key: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(key, self.default_config.clone()))
            })
            .clone()
    }

    /// Reset a breaker by key. Returns false if no breaker exists for it.
    pub fn reset(&self, key: &str) -> bool {
        let breakers = self.breakers.lock().unwrap();
        match breakers.get(key) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let breakers = self.breakers.lock().unwrap();
        let mut snaps: Vec<BreakerSnapshot> = breakers.values().map(|b| b.snapshot()).collect();
        snaps.sort_by(|a, b| a.key.cmp(&b.key));
        snaps
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
