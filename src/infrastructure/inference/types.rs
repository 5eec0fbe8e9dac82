//! Wire types of the chat completions response.
//!
//! Only the fields the pipeline reads are modeled; everything else the
//! endpoint returns is ignored.

use serde::Deserialize;

/// Body of a chat completions response
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    /// Response identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Model that served the request
    #[serde(default)]
    pub model: Option<String>,
    /// Generated alternatives
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Token accounting
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// One generated alternative
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    /// Position in `choices`
    #[serde(default)]
    pub index: u32,
    /// The generated message
    pub message: ResponseMessage,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Message part of a choice
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    /// Generated text
    #[serde(default)]
    pub content: Option<String>,
}

/// Token counts reported by the endpoint
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Tokens generated
    #[serde(default)]
    pub completion_tokens: u32,
}

impl ChatCompletionResponse {
    /// Text of the first choice, if it carries any
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|text| !text.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_response() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}]}"#;
        let response: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.first_content(), Some("hi"));
    }

    #[test]
    fn test_blank_content_is_none() {
        let json = r#"{"choices":[{"message":{"content":"   "}}]}"#;
        let response: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.first_content(), None);
    }

    #[test]
    fn test_no_choices() {
        let response: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(response.first_content().is_none());
    }
}
