//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use covgen::domain::models::{Config, RateLimitConfig, RetryConfig};
use covgen::domain::ports::{CompletionClient, CompletionRequest, InferenceError};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Completion client replying per source path named in the prompt
///
/// Paths without a scripted reply fail with a server error on every attempt.
#[derive(Default)]
pub struct ScriptedClient {
    replies: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, source_path: &str, text: &str) -> Self {
        self.replies.insert(source_path.to_string(), text.to_string());
        self
    }

    /// Source paths of every call received, retries included
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError> {
        let user = &request.messages.last().unwrap().content;
        let path = user
            .lines()
            .next()
            .and_then(|line| line.rsplit_once(": "))
            .map(|(_, path)| path.trim().to_string())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(path.clone());

        self.replies
            .get(&path)
            .cloned()
            .ok_or_else(|| InferenceError::Server(503, "unavailable".to_string()))
    }
}

/// Config rooted at `root` with fast retries and artifacts under `root/out`
pub fn config(root: &Path) -> Config {
    Config {
        repo_root: root.to_path_buf(),
        output_dir: root.join("out"),
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        },
        rate_limit: RateLimitConfig {
            requests_per_second: 1000.0,
        },
        ..Config::default()
    }
}

/// Write `content` to `root/relative`, creating parent directories
pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// A small Python module and its source text
pub fn python_module(name: &str) -> String {
    format!("def {name}(a, b):\n    if b == 0:\n        raise ValueError('b')\n    return a + b\n")
}

/// A fenced pytest reply exercising `function` from `module`
pub fn pytest_reply(module: &str, function: &str) -> String {
    format!(
        "Here are the tests:\n\n```python\nfrom app.{module} import {function}\n\n\ndef test_{function}_happy_path():\n    assert {function}(1, 2) == 3\n\n\ndef test_{function}_rejects_zero():\n    import pytest\n    with pytest.raises(ValueError):\n        {function}(1, 0)\n```\n"
    )
}
