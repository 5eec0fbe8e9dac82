//! End-to-end runs of the generation pipeline against a scripted model
//!
//! Each test builds a throwaway repository in a temp dir, writes a coverage
//! report, and drives `PipelineOrchestrator::run` through ingestion,
//! selection, generation, validation and merging.

mod common;

use common::{config, python_module, pytest_reply, write_file, ScriptedClient};
use covgen::application::{PipelineOrchestrator, ProgressEvent, PATCH_FILE_NAME, SUMMARY_FILE_NAME};
use covgen::domain::models::{Config, OutcomeStatus, RunStatus, ValidationStatus};
use covgen::infrastructure::coverage::CoverageIngester;
use covgen::services::FileSelector;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn write_coverage(root: &Path, entries: &[(&str, u64)]) -> std::path::PathBuf {
    let mut report = serde_json::Map::new();
    for (path, covered) in entries {
        report.insert(
            (*path).to_string(),
            json!({ "statements": { "covered": covered, "total": 100 } }),
        );
    }
    let path = root.join("coverage.json");
    std::fs::write(&path, serde_json::to_string(&report).unwrap()).unwrap();
    path
}

async fn run(config: Config, client: Arc<ScriptedClient>, coverage: &Path) -> covgen::RunReport {
    PipelineOrchestrator::new(Arc::new(config), client)
        .run(coverage, CancellationToken::new())
        .await
        .expect("run should succeed")
}

#[test]
fn test_least_covered_files_are_selected_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let coverage = write_coverage(
        dir.path(),
        &[("app/a.py", 10), ("app/b.py", 20), ("app/c.py", 95), ("app/d.py", 5), ("app/e.py", 60)],
    );
    let report = CoverageIngester::load(&coverage).unwrap();

    let config = Config {
        max_files: 3,
        target_coverage: 80.0,
        ..config(dir.path())
    };
    let candidates = FileSelector::from_config(&config).unwrap().select(&report);

    let ranked: Vec<(&str, f64, usize)> = candidates
        .iter()
        .map(|c| (c.path.as_str(), c.coverage_pct, c.rank))
        .collect();
    assert_eq!(
        ranked,
        vec![("app/d.py", 5.0, 1), ("app/a.py", 10.0, 2), ("app/b.py", 20.0, 3)]
    );
}

#[tokio::test]
async fn test_excluded_paths_are_never_sent_to_the_model() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "tests/test_foo.py", "def test_foo():\n    pass\n");
    write_file(dir.path(), "app/foo.py", &python_module("foo"));
    let coverage = write_coverage(dir.path(), &[("tests/test_foo.py", 0), ("app/foo.py", 40)]);

    let client = Arc::new(ScriptedClient::new().reply("app/foo.py", &pytest_reply("foo", "foo")));
    let config = Config {
        exclude_patterns: vec!["tests/*".to_string()],
        ..config(dir.path())
    };
    let report = run(config, Arc::clone(&client), &coverage).await;

    assert_eq!(client.calls(), vec!["app/foo.py".to_string()]);
    assert!(report.summary.details.iter().all(|d| d.path != "tests/test_foo.py"));
    assert_eq!(report.summary.files_processed, 1);
}

#[tokio::test]
async fn test_model_failure_leaves_other_candidates_untouched() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "app/flaky.py", &python_module("flaky"));
    write_file(dir.path(), "app/calc.py", &python_module("add"));
    let coverage = write_coverage(dir.path(), &[("app/flaky.py", 5), ("app/calc.py", 30)]);

    // nothing scripted for app/flaky.py: every attempt fails
    let client = Arc::new(ScriptedClient::new().reply("app/calc.py", &pytest_reply("calc", "add")));
    let report = run(config(dir.path()), Arc::clone(&client), &coverage).await;
    let summary = &report.summary;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.files_processed, 2);
    assert_eq!(summary.tests_generated, 2);

    let flaky = summary.details.iter().find(|d| d.path == "app/flaky.py").unwrap();
    assert_eq!(flaky.status, OutcomeStatus::Skipped);
    assert_eq!(flaky.validation_status, Some(ValidationStatus::ModelFailure));
    assert_eq!(flaky.tests_added, 0);
    assert_eq!(client.calls().iter().filter(|p| *p == "app/flaky.py").count(), 3);
    assert!(!dir.path().join("tests/test_flaky.py").exists());

    let calc = summary.details.iter().find(|d| d.path == "app/calc.py").unwrap();
    assert_eq!(calc.status, OutcomeStatus::Merged);
    let written = std::fs::read_to_string(dir.path().join("tests/test_calc.py")).unwrap();
    assert!(written.contains("def test_add_happy_path():"));
    assert!(!written.contains("flaky"));
}

#[tokio::test]
async fn test_prose_reply_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "app/calc.py", &python_module("add"));
    let coverage = write_coverage(dir.path(), &[("app/calc.py", 10)]);

    let client = Arc::new(
        ScriptedClient::new().reply("app/calc.py", "I would test the add function with several inputs."),
    );
    let report = run(config(dir.path()), client, &coverage).await;

    let detail = &report.summary.details[0];
    assert_eq!(detail.status, OutcomeStatus::Skipped);
    assert_eq!(detail.validation_status, Some(ValidationStatus::Empty));
    assert!(!dir.path().join("tests/test_calc.py").exists());
    assert!(report.patch_path.is_none());
    assert_eq!(report.summary.tests_generated, 0);
}

#[tokio::test]
async fn test_summary_and_patch_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "app/calc.py", &python_module("add"));
    let coverage = write_coverage(dir.path(), &[("app/calc.py", 10)]);

    let client = Arc::new(ScriptedClient::new().reply("app/calc.py", &pytest_reply("calc", "add")));
    let report = run(config(dir.path()), client, &coverage).await;

    assert_eq!(report.summary_path, dir.path().join("out").join(SUMMARY_FILE_NAME));
    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report.summary_path).unwrap()).unwrap();
    assert_eq!(summary["status"], "completed");
    assert_eq!(summary["files_processed"], 1);
    assert_eq!(summary["tests_generated"], 2);
    assert_eq!(summary["details"][0]["path"], "app/calc.py");
    assert_eq!(summary["details"][0]["coverage_before"], 10.0);
    assert_eq!(summary["details"][0]["status"], "merged");
    assert_eq!(summary["details"][0]["tests_added"], 2);

    let patch_path = report.patch_path.unwrap();
    assert_eq!(patch_path, dir.path().join("out").join(PATCH_FILE_NAME));
    let patch = std::fs::read_to_string(patch_path).unwrap();
    assert!(patch.contains("+++ b/tests/test_calc.py"));
    assert!(patch.contains("+def test_add_rejects_zero():"));
}

#[tokio::test]
async fn test_dry_run_reports_patch_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "app/calc.py", &python_module("add"));
    let coverage = write_coverage(dir.path(), &[("app/calc.py", 10)]);

    let client = Arc::new(ScriptedClient::new().reply("app/calc.py", &pytest_reply("calc", "add")));
    let config = Config {
        apply: false,
        ..config(dir.path())
    };
    let report = run(config, client, &coverage).await;

    assert_eq!(report.summary.details[0].status, OutcomeStatus::Merged);
    assert!(report.patch_path.is_some());
    assert!(!dir.path().join("tests/test_calc.py").exists());
}

#[tokio::test]
async fn test_second_run_adds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "app/calc.py", &python_module("add"));
    let coverage = write_coverage(dir.path(), &[("app/calc.py", 10)]);
    let reply = pytest_reply("calc", "add");

    let first = run(
        config(dir.path()),
        Arc::new(ScriptedClient::new().reply("app/calc.py", &reply)),
        &coverage,
    )
    .await;
    assert_eq!(first.summary.tests_generated, 2);
    let after_first = std::fs::read_to_string(dir.path().join("tests/test_calc.py")).unwrap();

    let second = run(
        config(dir.path()),
        Arc::new(ScriptedClient::new().reply("app/calc.py", &reply)),
        &coverage,
    )
    .await;
    assert_eq!(second.summary.tests_generated, 0);
    assert_eq!(second.summary.details[0].reason.as_deref(), Some("no new tests"));
    let after_second = std::fs::read_to_string(dir.path().join("tests/test_calc.py")).unwrap();
    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn test_candidates_sharing_an_artifact_accumulate() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "app/models.py", &python_module("save"));
    write_file(dir.path(), "lib/models.py", &python_module("load"));
    let coverage = write_coverage(dir.path(), &[("app/models.py", 10), ("lib/models.py", 20)]);

    let client = Arc::new(
        ScriptedClient::new()
            .reply("app/models.py", &pytest_reply("models", "save"))
            .reply("lib/models.py", &pytest_reply("models", "load")),
    );
    let config = Config {
        apply: false,
        concurrency: 4,
        ..config(dir.path())
    };
    let report = run(config, client, &coverage).await;

    assert_eq!(report.summary.merged_count(), 2);
    let patch = std::fs::read_to_string(report.patch_path.unwrap()).unwrap();
    // the second patch starts from the first one's result
    assert!(patch.contains("--- /dev/null"));
    assert!(patch.contains("--- a/tests/test_models.py"));
    assert!(patch.contains("+def test_load_happy_path():"));
}

#[tokio::test]
async fn test_cancelled_run_skips_everything() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "app/calc.py", &python_module("add"));
    let coverage = write_coverage(dir.path(), &[("app/calc.py", 10)]);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let client = Arc::new(ScriptedClient::new().reply("app/calc.py", &pytest_reply("calc", "add")));
    let report = PipelineOrchestrator::new(Arc::new(config(dir.path())), client.clone())
        .run(&coverage, cancel)
        .await
        .unwrap();

    assert_eq!(report.summary.status, RunStatus::Cancelled);
    assert_eq!(report.summary.files_processed, 0);
    assert_eq!(report.summary.details[0].status, OutcomeStatus::Skipped);
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_progress_events_cover_every_candidate() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "app/calc.py", &python_module("add"));
    write_file(dir.path(), "app/flaky.py", &python_module("flaky"));
    let coverage = write_coverage(dir.path(), &[("app/calc.py", 10), ("app/flaky.py", 15)]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = Arc::new(ScriptedClient::new().reply("app/calc.py", &pytest_reply("calc", "add")));
    PipelineOrchestrator::new(Arc::new(config(dir.path())), client)
        .with_progress(tx)
        .run(&coverage, CancellationToken::new())
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events[0], ProgressEvent::Started { total: 2 });
    let finished = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::CandidateFinished { .. }))
        .count();
    assert_eq!(finished, 2);
}

#[tokio::test]
async fn test_unreadable_coverage_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = PipelineOrchestrator::new(Arc::new(config(dir.path())), Arc::new(ScriptedClient::new()))
        .run(&dir.path().join("missing.json"), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert!(!dir.path().join("out").exists());
}
