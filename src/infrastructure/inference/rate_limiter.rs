//! Request pacing shared by all workers.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Token bucket rate limiter shared by every worker of a run
///
/// Tokens refill continuously at `refill_rate` per second. The bucket holds at
/// least one token so that sub-1 rates still make progress.
#[derive(Clone)]
pub struct TokenBucketRateLimiter {
    /// Current token count and the instant it was last refilled
    state: Arc<Mutex<BucketState>>,
    capacity: f64,
    refill_rate: f64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucketRateLimiter {
    /// Create a limiter allowing `requests_per_second` sustained requests.
    ///
    /// Callers validate the rate beforehand; non-positive rates are clamped to
    /// a very slow but finite refill.
    pub fn new(requests_per_second: f64) -> Self {
        let refill_rate = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            requests_per_second
        } else {
            1e-3
        };
        let capacity = refill_rate.max(1.0);

        Self {
            state: Arc::new(Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            })),
            capacity,
            refill_rate,
        }
    }

    /// Wait until a token is available, then consume it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }

                let deficit = 1.0 - state.tokens;
                Duration::from_secs_f64(deficit / self.refill_rate)
            };

            sleep(wait).await;
        }
    }

    /// Tokens currently available (refilled to now)
    pub async fn available_tokens(&self) -> f64 {
        let state = self.state.lock().await;
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        (state.tokens + elapsed * self.refill_rate).min(self.capacity)
    }
}
