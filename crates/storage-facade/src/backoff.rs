//! Exponential backoff gating for connection creation.
//!
//! [`RetryBackoffController`] is a small state machine over
//! `{ failure_count, last_failure }`. It performs no I/O and never sleeps;
//! callers ask it whether an attempt is permitted now and how long to wait
//! otherwise.
//!
//! # Backoff Strategy
//!
//! - The delay for attempt `n` is `base_delay * 2^n`, capped at `max_delay`.
//! - After `n` consecutive failures, the next attempt is permitted once
//!   `delay_for_attempt(n)` has elapsed since the last failure.
//! - Once `failure_count` reaches `max_failures`, no attempt is permitted
//!   until [`reset`](RetryBackoffController::reset) or
//!   [`record_success`](RetryBackoffController::record_success), whatever the
//!   wall-clock time.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::BackoffConfig;

/// Returns `base * 2^attempt`, capped at `max`.
///
/// Saturates instead of overflowing for large attempt numbers.
#[must_use]
pub fn compute_backoff(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(max)
}

/// Outcome of [`RetryBackoffController::gate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffGate {
    /// An attempt may be made now.
    Open,
    /// An attempt is permitted once the duration has elapsed.
    Wait(Duration),
    /// The failure ceiling was reached; only a reset permits attempts.
    Exhausted,
}

#[derive(Debug, Default)]
struct RetryState {
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Tracks consecutive connection failures and decides when a retry is
/// permitted.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use hearth_storage_facade::{BackoffConfig, RetryBackoffController};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backoff = RetryBackoffController::new(BackoffConfig::default());
/// assert!(backoff.can_retry_now());
///
/// backoff.record_failure();
/// assert!(!backoff.can_retry_now());
/// assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(200));
///
/// backoff.record_success();
/// assert!(backoff.can_retry_now());
/// # });
/// ```
#[derive(Debug)]
pub struct RetryBackoffController {
    config: BackoffConfig,
    state: Mutex<RetryState>,
}

impl RetryBackoffController {
    /// Creates a controller with no recorded failures.
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, state: Mutex::new(RetryState::default()) }
    }

    /// Returns the policy this controller applies.
    #[must_use]
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Returns the delay associated with attempt `attempt`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        compute_backoff(self.config.base_delay(), self.config.max_delay(), attempt)
    }

    /// Returns `true` if an attempt is permitted now.
    #[must_use]
    pub fn can_retry_now(&self) -> bool {
        self.gate() == BackoffGate::Open
    }

    /// Returns whether an attempt is permitted now and, if not, what
    /// stands in the way.
    #[must_use]
    pub fn gate(&self) -> BackoffGate {
        let state = self.state.lock();
        let Some(last_failure) = state.last_failure else {
            return BackoffGate::Open;
        };
        if state.failure_count >= self.config.max_failures() {
            return BackoffGate::Exhausted;
        }
        let required = self.delay_for_attempt(state.failure_count);
        match required.checked_sub(last_failure.elapsed()) {
            Some(remaining) if !remaining.is_zero() => BackoffGate::Wait(remaining),
            _ => BackoffGate::Open,
        }
    }

    /// Clears the failure count and last-failure time.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if state.failure_count > 0 {
            tracing::debug!(previous_failures = state.failure_count, "backoff cleared after success");
        }
        *state = RetryState::default();
    }

    /// Records a failure now and returns the new consecutive-failure count.
    pub fn record_failure(&self) -> u32 {
        let mut state = self.state.lock();
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure = Some(Instant::now());
        if state.failure_count >= self.config.max_failures() {
            tracing::warn!(
                failure_count = state.failure_count,
                max_failures = self.config.max_failures(),
                "backoff ceiling reached; attempts refused until reset",
            );
        }
        state.failure_count
    }

    /// Resets to the initial state. Used when the handle expires or is
    /// invalidated.
    pub fn reset(&self) {
        *self.state.lock() = RetryState::default();
    }

    /// Returns the time since the last recorded failure, if any.
    #[must_use]
    pub fn since_last_failure(&self) -> Option<Duration> {
        self.state.lock().last_failure.map(|at| at.elapsed())
    }

    /// Returns the current consecutive-failure count.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }
}
