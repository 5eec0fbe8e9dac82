//! Pipeline stages that run without network access.

pub mod file_selector;
pub mod framework;
pub mod prompt_builder;
pub mod response_validator;
pub mod structure_extractor;
pub mod test_locator;
pub mod test_merger;
pub mod test_names;

pub use file_selector::FileSelector;
pub use framework::{default_framework, detect_framework, resolve_framework};
pub use prompt_builder::{Prompt, PromptBuilder, SYSTEM_PROMPT};
pub use response_validator::ResponseValidator;
pub use structure_extractor::StructureExtractor;
pub use test_locator::TestLocator;
pub use test_merger::{DiffSummary, MergeDecision, MergePlan, TestMerger};
pub use test_names::extract_test_names;
