//! Run orchestration: per-candidate processing and the run-level pipeline.

pub mod candidate_processor;
pub mod pipeline_orchestrator;

pub use candidate_processor::CandidateProcessor;
pub use pipeline_orchestrator::{
    ArtifactGroup, PipelineOrchestrator, ProgressEvent, RunReport, PATCH_FILE_NAME, SUMMARY_FILE_NAME,
};
