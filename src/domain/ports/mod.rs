//! Port trait definitions
//!
//! Contracts the pipeline depends on without knowing the concrete adapter:
//! - CompletionClient: the language model completion endpoint

pub mod completion_client;

pub use completion_client::{ChatMessage, CompletionClient, CompletionRequest, InferenceError, Role};
