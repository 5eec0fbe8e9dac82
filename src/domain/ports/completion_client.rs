//! Port to a chat completion endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of a chat message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the conversation
    System,
    /// The caller
    User,
    /// The model
    Assistant,
}

/// A single role-tagged message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author
    pub role: Role,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// A system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Request sent to a completion endpoint
///
/// Serializes to the OpenAI-compatible chat completions body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier (e.g., "openai/gpt-4.1-mini")
    pub model: String,

    /// Ordered conversation, system framing first
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature
    pub temperature: f32,

    /// Nucleus sampling mass
    pub top_p: f32,

    /// Completion token limit
    pub max_tokens: u32,
}

/// Errors a single completion attempt can produce
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    /// Malformed request (HTTP 400, 422)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or rejected credentials (HTTP 401)
    #[error("Authentication failed")]
    Unauthorized,

    /// Credentials lack permission for the model (HTTP 403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unknown model or endpoint (HTTP 404)
    #[error("Model or endpoint not found")]
    NotFound,

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Server-side failure (HTTP 5xx, 408)
    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// The attempt exceeded the per-call timeout
    #[error("Request timed out")]
    Timeout,

    /// The endpoint answered but the payload carried no usable text
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Unexpected status
    #[error("Unexpected status ({0}): {1}")]
    Unexpected(u16, String),
}

impl InferenceError {
    /// Returns true if this error is transient and should be retried
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Server(..) | Self::Network(_) | Self::Timeout
        )
    }

    /// Classify an HTTP error status
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            400 | 422 => Self::InvalidRequest(body),
            401 => Self::Unauthorized,
            403 => Self::Forbidden(body),
            404 => Self::NotFound,
            429 => Self::RateLimited,
            408 | 500..=599 => Self::Server(status, body),
            _ => Self::Unexpected(status, body),
        }
    }
}

/// Completion endpoint port.
///
/// Implementations perform exactly one attempt; retry, backoff, timeout and
/// cancellation are layered on top by `ModelClient`.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send the request and return the assistant's reply text
    async fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError>;
}
