//! # Reconnect Scheduling
//!
//! Exponential backoff between reconnect attempts: delay doubles per failed
//! attempt up to a cap, and the attempt counter resets only when a connection
//! actually reaches the connected state. At most one timer is pending at any
//! time; scheduling cancels the previous one, so bursts of channel errors
//! collapse into a single attempt.

use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::observability::Logger;

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first reconnect attempt
    pub initial_delay: Duration,
    /// Upper bound on the computed delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    /// Delay for the given zero-based attempt: min(initial * 2^attempt, max)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let doubled = self
            .initial_delay
            .checked_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
            .unwrap_or(self.max_delay);
        doubled.min(self.max_delay)
    }
}

struct RetryState {
    attempts: u32,
    pending: Option<JoinHandle<()>>,
}

/// Schedules delayed reconnect attempts with at most one pending timer
pub struct RetryScheduler {
    policy: RetryPolicy,
    state: Mutex<RetryState>,
}

impl RetryScheduler {
    /// Create a scheduler with the given backoff policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(RetryState {
                attempts: 0,
                pending: None,
            }),
        }
    }

    /// Number of failed attempts since the last successful connect
    pub fn attempts(&self) -> u32 {
        self.state.lock().map(|s| s.attempts).unwrap_or(0)
    }

    /// Schedule a reconnect attempt after the current backoff delay.
    ///
    /// Any previously pending timer is cancelled first; there are never two
    /// overlapping timers. Returns the delay that was scheduled. Must run
    /// inside a tokio runtime.
    pub fn schedule<F>(&self, reconnect: F) -> Duration
    where
        F: FnOnce() + Send + 'static,
    {
        let Ok(mut state) = self.state.lock() else {
            return self.policy.max_delay;
        };

        if let Some(pending) = state.pending.take() {
            pending.abort();
        }

        let delay = self.policy.delay_for(state.attempts);
        state.attempts = state.attempts.saturating_add(1);
        let attempt = state.attempts;

        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            reconnect();
        }));

        Logger::warn(
            "REALTIME_RETRY_SCHEDULED",
            &[
                ("attempt", &attempt.to_string()),
                ("delay_ms", &delay.as_millis().to_string()),
            ],
        );

        delay
    }

    /// Cancel any pending timer synchronously. The reconnect closure of a
    /// cancelled timer will not run.
    pub fn cancel(&self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(pending) = state.pending.take() {
                pending.abort();
            }
        }
    }

    /// Reset the attempt counter after a successful connect. Also drops any
    /// pending timer, which cannot be valid once connected.
    pub fn reset(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.attempts = 0;
            if let Some(pending) = state.pending.take() {
                pending.abort();
            }
        }
    }
}
