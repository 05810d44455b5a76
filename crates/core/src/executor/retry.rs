//! Retry policy and circuit breaker.

use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Retry policy for a pool's failed jobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryPolicy {
    None,
    Fixed {
        attempts: usize,
        delay: Duration,
    },
    Exponential {
        base_delay: Duration,
        max_delay: Duration,
        max_attempts: usize,
        multiplier: f64,
    },
}

impl RetryPolicy {
    pub fn fixed(attempts: usize, delay: Duration) -> Self {
        RetryPolicy::Fixed { attempts, delay }
    }

    /// Exponential backoff capped at 5s, the default for STT/LLM pools.
    pub fn exponential(max_attempts: usize) -> Self {
        RetryPolicy::Exponential {
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            max_attempts,
            multiplier: 2.0,
        }
    }

    pub fn delay_for_attempt(&self, attempt: usize) -> Option<Duration> {
        match self {
            RetryPolicy::None => None,
            RetryPolicy::Fixed { attempts, delay } => (attempt < *attempts).then_some(*delay),
            RetryPolicy::Exponential {
                base_delay,
                max_delay,
                max_attempts,
                multiplier,
            } => {
                if attempt >= *max_attempts {
                    return None;
                }
                let delay_ms = (base_delay.as_millis() as f64) * multiplier.powi(attempt as i32);
                Some(Duration::from_millis(delay_ms as u64).min(*max_delay))
            }
        }
    }

    pub fn max_attempts(&self) -> usize {
        match self {
            RetryPolicy::None => 0,
            RetryPolicy::Fixed { attempts, .. } => *attempts,
            RetryPolicy::Exponential { max_attempts, .. } => *max_attempts,
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Trips open after `failure_threshold` consecutive failures; half-opens
/// for a single test request after `reset_timeout`.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    failure_threshold: usize,
    failure_count: usize,
    state: CircuitState,
    last_failure_time: Option<Instant>,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: usize) -> Self {
        Self::with_timeout(failure_threshold, Duration::from_secs(30))
    }

    pub fn with_timeout(failure_threshold: usize, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            failure_count: 0,
            state: CircuitState::Closed,
            last_failure_time: None,
            reset_timeout,
        }
    }

    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.state = CircuitState::Closed;
        self.last_failure_time = None;
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_time = Some(Instant::now());
        match self.state {
            CircuitState::Closed => {
                if self.failure_count >= self.failure_threshold {
                    self.state = CircuitState::Open;
                    tracing::warn!(failures = self.failure_count, "circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                tracing::warn!("circuit breaker test request failed, reopening");
            }
            CircuitState::Open => {}
        }
    }

    /// Transitions Open -> HalfOpen once `reset_timeout` has elapsed.
    pub fn is_open(&mut self) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => false,
            CircuitState::Open => {
                if let Some(last) = self.last_failure_time {
                    if last.elapsed() >= self.reset_timeout {
                        self.state = CircuitState::HalfOpen;
                        return false;
                    }
                }
                true
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> usize {
        self.failure_count
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Run `operation` under `policy`, sleeping between attempts per
/// `delay_for_attempt`. Cancellation errors are never retried.
pub async fn execute_with_retry<F, Fut, T>(policy: RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts();
    if max_attempts == 0 {
        return operation().await;
    }

    let mut attempt = 0;
    let mut last_error;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_cancellation() => return Err(err),
            Err(err) => {
                last_error = err;
                attempt += 1;
                match policy.delay_for_attempt(attempt - 1) {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => break,
                }
            }
        }
    }

    Err(Error::Execution(format!(
        "retry exhausted after {attempt} attempts: {last_error}"
    )))
}
