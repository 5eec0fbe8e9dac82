//! Rate-limited, retried model invocation.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::rate_limiter::TokenBucketRateLimiter;
use super::retry::{RetryError, RetryPolicy};
use crate::domain::models::Config;
use crate::domain::ports::{CompletionClient, CompletionRequest, InferenceError};
use crate::domain::PipelineError;

/// Completion invoker with rate limiting, per-call timeout and bounded retry
///
/// One `ModelClient` is shared by all workers. Retry state is created per
/// call, so a failing candidate never consumes another candidate's attempts.
#[derive(Clone)]
pub struct ModelClient {
    client: Arc<dyn CompletionClient>,
    rate_limiter: TokenBucketRateLimiter,
    retry_policy: RetryPolicy,
    call_timeout: Duration,
}

impl ModelClient {
    /// Wrap `client` with the given pacing and retry policy
    pub fn new(
        client: Arc<dyn CompletionClient>,
        rate_limiter: TokenBucketRateLimiter,
        retry_policy: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            client,
            rate_limiter,
            retry_policy,
            call_timeout,
        }
    }

    /// Build from the model, rate limit and retry sections of `config`
    pub fn from_config(client: Arc<dyn CompletionClient>, config: &Config) -> Self {
        Self::new(
            client,
            TokenBucketRateLimiter::new(config.rate_limit.requests_per_second),
            RetryPolicy::from(&config.retry),
            Duration::from_secs(config.model.timeout_secs),
        )
    }

    /// Invoke the endpoint and return the raw reply text.
    ///
    /// Non-retryable failures and exhausted retries become `ModelFailure`.
    /// A call already sent finishes or times out even after `cancel` fires;
    /// cancellation before a call or during a backoff wait yields `Cancelled`.
    #[instrument(skip(self, request, cancel), fields(model = %request.model))]
    pub async fn invoke(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let result = self
            .retry_policy
            .execute(cancel, |attempt| self.attempt(request, attempt))
            .await;

        match result {
            Ok(text) => Ok(text),
            Err(RetryError::Cancelled) => Err(PipelineError::Cancelled),
            Err(RetryError::Permanent(err)) => {
                warn!(error = %err, "Model call failed permanently");
                Err(PipelineError::ModelFailure(err.to_string()))
            }
            Err(err @ RetryError::Exhausted { .. }) => {
                warn!(error = %err, "Model call retries exhausted");
                Err(PipelineError::ModelFailure(err.to_string()))
            }
        }
    }

    async fn attempt(&self, request: &CompletionRequest, attempt: u32) -> Result<String, InferenceError> {
        self.rate_limiter.acquire().await;
        info!(attempt, "Calling completion endpoint");

        match tokio::time::timeout(self.call_timeout, self.client.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ChatMessage;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<VecDeque<Result<String, InferenceError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, InferenceError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl CompletionClient for Scripted {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, InferenceError> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(InferenceError::Server(500, "script exhausted".into())))
        }
    }

    struct Hanging;

    #[async_trait]
    impl CompletionClient for Hanging {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, InferenceError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    /// Answers after a delay
    struct Slow(Duration);

    #[async_trait]
    impl CompletionClient for Slow {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, InferenceError> {
            tokio::time::sleep(self.0).await;
            Ok("def test_slow(): pass".to_string())
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "test-model".to_string(),
            messages: vec![ChatMessage::user("write tests")],
            temperature: 0.2,
            top_p: 1.0,
            max_tokens: 64,
        }
    }

    fn client(inner: Arc<dyn CompletionClient>, attempts: u32) -> ModelClient {
        ModelClient::new(
            inner,
            TokenBucketRateLimiter::new(1000.0),
            RetryPolicy::new(attempts, 1, 2),
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let scripted = Scripted::new(vec![
            Err(InferenceError::RateLimited),
            Ok("def test_x(): pass".to_string()),
        ]);
        let model = client(scripted.clone(), 3);

        let text = model.invoke(&request(), &CancellationToken::new()).await.unwrap();
        assert_eq!(text, "def test_x(): pass");
        assert_eq!(scripted.calls(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_model_failure() {
        let scripted = Scripted::new(vec![]);
        let model = client(scripted.clone(), 3);

        let err = model.invoke(&request(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::ModelFailure(_)));
        assert_eq!(scripted.calls(), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let scripted = Scripted::new(vec![Err(InferenceError::Unauthorized)]);
        let model = client(scripted.clone(), 5);

        let err = model.invoke(&request(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::ModelFailure(_)));
        assert_eq!(scripted.calls(), 1);
    }

    #[tokio::test]
    async fn test_per_call_timeout_is_retryable() {
        let model = client(Arc::new(Hanging), 2);
        let err = model.invoke(&request(), &CancellationToken::new()).await.unwrap_err();
        match err {
            PipelineError::ModelFailure(msg) => assert!(msg.contains("2 attempts")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_in_flight_call_finishes_after_cancel() {
        let model = client(Arc::new(Slow(Duration::from_millis(30))), 3);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            trigger.cancel();
        });

        let text = model.invoke(&request(), &cancel).await.unwrap();
        assert_eq!(text, "def test_slow(): pass");
    }

    #[tokio::test]
    async fn test_cancellation_stops_retries_after_timeout() {
        let model = client(Arc::new(Hanging), 3);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let start = std::time::Instant::now();
        let err = model.invoke(&request(), &cancel).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        // the first call ran to its 50ms timeout; no second call was made
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_millis(100 * 3));
    }

    #[tokio::test]
    async fn test_cancelled_before_call_is_not_sent() {
        let scripted = Scripted::new(vec![Ok("unused".to_string())]);
        let model = client(scripted.clone(), 3);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = model.invoke(&request(), &cancel).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(scripted.calls(), 0);
    }
}
