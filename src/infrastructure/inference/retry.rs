//! Bounded retry with exponential backoff, driven as an explicit state machine.
//!
//! ```text
//! Attempting(n) ──ok──────────────────────────→ Done
//!      │ transient && n < max ──→ Waiting(delay) ──elapsed──→ Attempting(n+1)
//!      │ transient && n == max ──→ Exhausted
//!      │ permanent ─────────────→ GaveUp
//!      └ cancelled before Attempting or during Waiting ──→ Cancelled
//! ```
//!
//! An attempt already dispatched is never abandoned: it runs until it answers
//! or hits its own call timeout, and cancellation is observed afterwards.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::models::RetryConfig;
use crate::domain::ports::InferenceError;

/// Exponential backoff policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy; backoff doubles from `initial_backoff_ms` up to `max_backoff_ms`
    pub fn new(max_attempts: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms.max(initial_backoff_ms)),
        }
    }

    /// Total attempts including the first
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given 1-based failed attempt: `initial * 2^(attempt-1)`, capped
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Fresh state for one candidate's call sequence
    pub fn start(&self) -> RetryState {
        RetryState {
            policy: self.clone(),
            attempt: 1,
        }
    }

    /// Run `operation` until it succeeds, fails permanently, exhausts its
    /// attempts, or `cancel` fires between attempts.
    pub async fn execute<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, InferenceError>>,
    {
        let mut state = self.start();

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            let attempt = state.attempt();
            let outcome = operation(attempt).await;

            let err = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Model call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            match state.on_failure(err) {
                RetryDecision::Retry { .. } if cancel.is_cancelled() => return Err(RetryError::Cancelled),
                RetryDecision::Retry { delay, error } => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient model failure, backing off"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(RetryError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::GiveUp(err) => return Err(err),
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then try again
    Retry {
        /// Backoff before the next attempt
        delay: Duration,
        /// The failure being retried
        error: InferenceError,
    },
    /// Stop with this error
    GiveUp(RetryError),
}

/// Attempt counter for one call sequence
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    /// 1-based number of the attempt about to run
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Classify a failure and advance the attempt counter when retrying
    pub fn on_failure(&mut self, error: InferenceError) -> RetryDecision {
        if !error.is_transient() {
            return RetryDecision::GiveUp(RetryError::Permanent(error));
        }
        if self.attempt >= self.policy.max_attempts {
            return RetryDecision::GiveUp(RetryError::Exhausted {
                attempts: self.attempt,
                last: error,
            });
        }

        let delay = self.policy.backoff_after(self.attempt);
        self.attempt += 1;
        RetryDecision::Retry { delay, error }
    }
}

/// Terminal failure of a retried call sequence
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// The failure is not worth retrying
    #[error("{0}")]
    Permanent(InferenceError),

    /// Every allowed attempt failed transiently
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Failure of the final attempt
        last: InferenceError,
    },

    /// Cancellation arrived before the sequence finished
    #[error("cancelled")]
    Cancelled,
}
