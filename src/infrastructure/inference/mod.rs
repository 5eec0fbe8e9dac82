//! Completion endpoint integration
//!
//! - `client`: HTTP adapter implementing the `CompletionClient` port
//! - `model_client`: retry, rate limiting and per-call timeout around a port
//! - `retry`: bounded exponential backoff state machine
//! - `rate_limiter`: token bucket shared across workers

pub mod client;
pub mod model_client;
pub mod rate_limiter;
pub mod retry;
pub mod types;

pub use client::ModelsHttpClient;
pub use model_client::ModelClient;
pub use rate_limiter::TokenBucketRateLimiter;
pub use retry::{RetryDecision, RetryError, RetryPolicy, RetryState};
