//! Per-candidate state machine.
//!
//! Drives one candidate from `Selected` to `Merged` or `Skipped`. Failures
//! never escape: every path resolves to a [`FileOutcome`].

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::domain::models::{
    CandidateFile, CandidateState, Config, FileOutcome, GenerationRequest, GenerationResult,
    OutcomeStatus, ValidationStatus,
};
use crate::domain::{PipelineError, PipelineResult};
use crate::infrastructure::inference::ModelClient;
use crate::services::test_merger::{MergeDecision, TestMerger};
use crate::services::{
    extract_test_names, resolve_framework, PromptBuilder, ResponseValidator, StructureExtractor,
    TestLocator,
};

/// Runs the pipeline stages for one candidate at a time
#[derive(Clone)]
pub struct CandidateProcessor {
    config: Arc<Config>,
    model: ModelClient,
    locator: TestLocator,
    prompt_builder: Arc<PromptBuilder>,
    merger: TestMerger,
}

impl CandidateProcessor {
    /// Create a processor for `config` calling the model through `model`
    pub fn new(config: Arc<Config>, model: ModelClient) -> Self {
        let locator = TestLocator::new(config.repo_root.clone());
        let prompt_builder = Arc::new(PromptBuilder::new(config.max_source_chars));
        let merger = TestMerger::new(config.apply);
        Self {
            config,
            model,
            locator,
            prompt_builder,
            merger,
        }
    }

    /// Test path resolution in use
    pub fn locator(&self) -> &TestLocator {
        &self.locator
    }

    /// Process `candidate` against the artifact `test_file`.
    ///
    /// `artifact` holds the artifact's current content and is updated after a
    /// merge, so candidates sharing an artifact build on each other even when
    /// nothing is written.
    #[instrument(skip(self, artifact, cancel), fields(path = %candidate.path, rank = candidate.rank))]
    pub async fn process(
        &self,
        candidate: CandidateFile,
        test_file: &str,
        artifact: &mut Option<String>,
        cancel: &CancellationToken,
    ) -> FileOutcome {
        let mut state = CandidateState::Selected;
        let path = candidate.path.clone();
        let coverage = candidate.coverage_pct;

        match self.run(candidate, test_file, artifact, cancel, &mut state).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, state = %state, "Candidate processing aborted");
                let mut outcome = FileOutcome::skipped(path, coverage, e.to_string());
                outcome.test_file = Some(test_file.to_string());
                outcome
            }
        }
    }

    async fn run(
        &self,
        candidate: CandidateFile,
        test_file: &str,
        artifact: &mut Option<String>,
        cancel: &CancellationToken,
        state: &mut CandidateState,
    ) -> PipelineResult<FileOutcome> {
        let language = candidate.language;
        let source_path = self.locator.resolve(&candidate.path);

        let source = match tokio::fs::read_to_string(&source_path).await {
            Ok(source) => source,
            Err(e) => {
                state.transition(CandidateState::Skipped)?;
                warn!(error = %e, "Source file unreadable");
                return Ok(self.skipped(&candidate, test_file, None, format!("source unreadable: {e}")));
            }
        };

        let structure = StructureExtractor::extract(language, &candidate.path, &source);
        state.transition(CandidateState::StructureExtracted)?;
        debug!(
            functions = structure.functions.len(),
            classes = structure.classes.len(),
            "Extracted structure"
        );

        let existing = artifact.as_deref();
        let framework = resolve_framework(&self.config.test_framework, language, existing);
        let request = GenerationRequest {
            candidate: candidate.clone(),
            test_file: test_file.to_string(),
            source,
            structure,
            framework,
            language,
            existing_tests: existing
                .map(|content| extract_test_names(language, content))
                .unwrap_or_default(),
        };
        let prompt = self.prompt_builder.build(&request);
        state.transition(CandidateState::PromptBuilt)?;

        let reply = self
            .model
            .invoke(&prompt.to_request(&self.config.model), cancel)
            .await;
        state.transition(CandidateState::ModelInvoked)?;

        let raw = match reply {
            Ok(raw) => raw,
            Err(PipelineError::Cancelled) => {
                state.transition(CandidateState::Skipped)?;
                return Ok(self.skipped(&candidate, test_file, None, "cancelled"));
            }
            Err(e) => {
                state.transition(CandidateState::Skipped)?;
                let result = GenerationResult::model_failure(candidate.clone());
                return Ok(self.skipped(
                    &candidate,
                    test_file,
                    Some(result.validation_status),
                    e.to_string(),
                ));
            }
        };

        let result = ResponseValidator::validate(&candidate, test_file, raw);
        state.transition(CandidateState::Validated)?;

        if !result.is_valid() {
            state.transition(CandidateState::Skipped)?;
            let reason = PipelineError::ValidationFailure(result.validation_status).to_string();
            info!(status = %result.validation_status, "Model response rejected");
            return Ok(self.skipped(&candidate, test_file, Some(result.validation_status), reason));
        }

        let artifact_path = self.locator.resolve(test_file);
        let decision = match self
            .merger
            .merge(&result, test_file, &artifact_path, artifact.as_deref())
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                state.transition(CandidateState::Skipped)?;
                return Ok(self.skipped(&candidate, test_file, Some(ValidationStatus::Valid), e.to_string()));
            }
        };

        match decision {
            MergeDecision::NothingNew => {
                state.transition(CandidateState::Skipped)?;
                let mut outcome = self.skipped(&candidate, test_file, Some(ValidationStatus::Valid), "no new tests");
                outcome.test_names = result.test_names;
                Ok(outcome)
            }
            MergeDecision::Merged { plan, written } => {
                state.transition(CandidateState::Merged)?;
                info!(
                    test_file,
                    tests_added = plan.tests_added.len(),
                    written,
                    "Merged generated tests"
                );
                let outcome = FileOutcome {
                    path: candidate.path.clone(),
                    coverage_before: candidate.coverage_pct,
                    status: OutcomeStatus::Merged,
                    tests_added: plan.tests_added.len(),
                    test_file: Some(test_file.to_string()),
                    validation_status: Some(ValidationStatus::Valid),
                    test_names: plan.tests_added,
                    reason: None,
                    patch: Some(plan.diff.patch),
                    dispatched: true,
                };
                *artifact = Some(plan.content);
                Ok(outcome)
            }
        }
    }

    fn skipped(
        &self,
        candidate: &CandidateFile,
        test_file: &str,
        validation_status: Option<ValidationStatus>,
        reason: impl Into<String>,
    ) -> FileOutcome {
        let mut outcome = FileOutcome::skipped(&candidate.path, candidate.coverage_pct, reason);
        outcome.test_file = Some(test_file.to_string());
        outcome.validation_status = validation_status;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Language;
    use crate::domain::ports::{CompletionClient, CompletionRequest, InferenceError};
    use crate::infrastructure::inference::{RetryPolicy, TokenBucketRateLimiter};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Replies with the same text every call, or rejects the token when `None`
    struct Fixed(Option<String>);

    #[async_trait]
    impl CompletionClient for Fixed {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, InferenceError> {
            self.0.clone().ok_or(InferenceError::Unauthorized)
        }
    }

    fn processor(root: &std::path::Path, reply: Option<String>, apply: bool) -> CandidateProcessor {
        let config = Config {
            repo_root: root.to_path_buf(),
            apply,
            ..Config::default()
        };
        let model = ModelClient::new(
            Arc::new(Fixed(reply)),
            TokenBucketRateLimiter::new(1000.0),
            RetryPolicy::new(2, 1, 2),
            Duration::from_secs(5),
        );
        CandidateProcessor::new(Arc::new(config), model)
    }

    fn candidate() -> CandidateFile {
        CandidateFile {
            path: "app/calc.py".to_string(),
            coverage_pct: 25.0,
            language: Language::Python,
            rank: 1,
        }
    }

    fn write_source(root: &std::path::Path) {
        std::fs::create_dir_all(root.join("app")).unwrap();
        std::fs::write(root.join("app/calc.py"), "def add(a, b):\n    return a + b\n").unwrap();
    }

    #[tokio::test]
    async fn test_valid_reply_is_merged_and_written() {
        let dir = tempfile::tempdir().unwrap();
        write_source(dir.path());
        let reply = "```python\nfrom app.calc import add\n\n\ndef test_add():\n    assert add(1, 2) == 3\n```";
        let processor = processor(dir.path(), Some(reply.to_string()), true);

        let mut artifact = None;
        let outcome = processor
            .process(candidate(), "tests/test_calc.py", &mut artifact, &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Merged);
        assert_eq!(outcome.tests_added, 1);
        assert!(outcome.patch.as_deref().unwrap().contains("+def test_add():"));
        let written = std::fs::read_to_string(dir.path().join("tests/test_calc.py")).unwrap();
        assert_eq!(artifact.as_deref(), Some(written.as_str()));
    }

    #[tokio::test]
    async fn test_model_failure_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_source(dir.path());
        let processor = processor(dir.path(), None, true);

        let mut artifact = None;
        let outcome = processor
            .process(candidate(), "tests/test_calc.py", &mut artifact, &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(outcome.validation_status, Some(ValidationStatus::ModelFailure));
        assert!(outcome.reason.as_deref().unwrap().starts_with("Model failure"));
        assert!(!dir.path().join("tests/test_calc.py").exists());
    }

    #[tokio::test]
    async fn test_prose_reply_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_source(dir.path());
        let processor = processor(dir.path(), Some("Sorry, I can't help with that.".to_string()), true);

        let mut artifact = None;
        let outcome = processor
            .process(candidate(), "tests/test_calc.py", &mut artifact, &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(outcome.validation_status, Some(ValidationStatus::Empty));
        assert!(artifact.is_none());
        assert!(!dir.path().join("tests").exists());
    }

    #[tokio::test]
    async fn test_missing_source_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let processor = processor(dir.path(), Some(String::new()), true);

        let mut artifact = None;
        let outcome = processor
            .process(candidate(), "tests/test_calc.py", &mut artifact, &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert!(outcome.reason.as_deref().unwrap().starts_with("source unreadable"));
    }

    #[tokio::test]
    async fn test_cancelled_call_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_source(dir.path());
        let processor = processor(dir.path(), Some("```python\ndef test_x():\n    pass\n```".to_string()), true);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut artifact = None;
        let outcome = processor
            .process(candidate(), "tests/test_calc.py", &mut artifact, &cancel)
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(outcome.reason.as_deref(), Some("cancelled"));
    }
}
