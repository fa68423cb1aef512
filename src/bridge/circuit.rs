//! Circuit breaker for the HTTP bridge.
//!
//! Closed → open after `failure_threshold` failures inside
//! `failure_window`; open → half-open once `reset_timeout` elapses; a
//! half-open success closes the breaker, a failure re-opens it.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures within the window that trip the breaker.
    pub failure_threshold: usize,
    /// Sliding window failures are counted over.
    pub failure_window: Duration,
    /// How long the breaker stays open before probing.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(10),
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum Inner {
    Closed { failures: VecDeque<Instant> },
    Open { since: Instant },
    HalfOpen,
}

/// Process-lifetime failure gate around an unreliable dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::Closed {
                failures: VecDeque::new(),
            }),
        }
    }

    /// Gate a call: `true` means proceed, `false` means fail fast.
    ///
    /// An open breaker whose reset timeout has elapsed moves to half-open
    /// and admits exactly this probe call.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match &*inner {
            Inner::Closed { .. } => true,
            Inner::HalfOpen => true,
            Inner::Open { since } => {
                if since.elapsed() >= self.config.reset_timeout {
                    *inner = Inner::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match &mut *inner {
            Inner::Closed { failures } => failures.clear(),
            Inner::HalfOpen | Inner::Open { .. } => {
                *inner = Inner::Closed {
                    failures: VecDeque::new(),
                };
            }
        }
    }

    /// Record a failed call; may trip the breaker.
    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match &mut *inner {
            Inner::Closed { failures } => {
                failures.push_back(now);
                while let Some(first) = failures.front() {
                    if now.duration_since(*first) > self.config.failure_window {
                        failures.pop_front();
                    } else {
                        break;
                    }
                }
                if failures.len() >= self.config.failure_threshold {
                    *inner = Inner::Open { since: now };
                }
            }
            Inner::HalfOpen => {
                *inner = Inner::Open { since: now };
            }
            Inner::Open { .. } => {}
        }
    }

    /// Current state, resolving an elapsed open window to half-open.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        match &*inner {
            Inner::Closed { .. } => CircuitState::Closed,
            Inner::HalfOpen => CircuitState::HalfOpen,
            Inner::Open { since } => {
                if since.elapsed() >= self.config.reset_timeout {
                    *inner = Inner::HalfOpen;
                    CircuitState::HalfOpen
                } else {
                    CircuitState::Open
                }
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
