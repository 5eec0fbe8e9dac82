//! HTTP adapter for OpenAI-compatible chat completion endpoints.

use async_trait::async_trait;
use reqwest::{header, Client as ReqwestClient};
use std::time::Duration;
use tracing::{debug, instrument};

use super::types::ChatCompletionResponse;
use crate::domain::models::ModelConfig;
use crate::domain::ports::{CompletionClient, CompletionRequest, InferenceError};
use crate::domain::PipelineError;

/// Single-attempt HTTP client for the completions endpoint
///
/// Connection pooling comes from the shared `reqwest::Client`; retry and the
/// per-call timeout live in `ModelClient`.
pub struct ModelsHttpClient {
    http_client: ReqwestClient,
    token: String,
    base_url: String,
}

impl ModelsHttpClient {
    /// Create a client for `base_url` authenticating with `token`
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, PipelineError> {
        let http_client = ReqwestClient::builder()
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| PipelineError::InvalidConfiguration(format!("failed to build HTTP client: {e}")))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        let token = token.into();
        debug!(endpoint = %base_url, token = %redact(&token), "Created completions client");

        Ok(Self {
            http_client,
            token,
            base_url,
        })
    }

    /// Build a client from configuration, reading the token from the
    /// environment variable named by `token_env`
    pub fn from_config(config: &ModelConfig) -> Result<Self, PipelineError> {
        let token = std::env::var(&config.token_env).map_err(|_| {
            PipelineError::InvalidConfiguration(format!(
                "environment variable {} holding the API token is not set",
                config.token_env
            ))
        })?;
        if token.trim().is_empty() {
            return Err(PipelineError::InvalidConfiguration(format!(
                "environment variable {} is empty",
                config.token_env
            )));
        }
        Self::new(config.endpoint.clone(), token)
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionClient for ModelsHttpClient {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError> {
        let response = self
            .http_client
            .post(self.completions_url())
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/json")
            .json(request)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error response".to_string());
            return Err(InferenceError::from_status(status.as_u16(), body));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;

        if let Some(usage) = parsed.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Completion usage"
            );
        }

        if parsed.choices.is_empty() {
            return Err(InferenceError::MalformedResponse("response has no choices".to_string()));
        }

        parsed
            .first_content()
            .map(str::to_string)
            .ok_or_else(|| InferenceError::MalformedResponse("first choice has no content".to_string()))
    }
}

fn classify_transport(err: reqwest::Error) -> InferenceError {
    if err.is_timeout() {
        InferenceError::Timeout
    } else {
        InferenceError::Network(err.to_string())
    }
}

/// Mask a credential for logging, keeping only a short prefix
pub fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(4).collect();
    if token.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{prefix}****")
    }
}
