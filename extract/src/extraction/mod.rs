//! Segment-by-segment extraction with schema feedback.
//!
//! - [`ExtractionOrchestrator`] - the per-file, per-segment state machine
//! - [`SchemaValidator`] - draft-07 validation and model-facing error text
//! - [`PromptBuilder`] - system and user prompts for a segment
//! - [`decode_candidates`] - code-fence decoding of assistant output
//! - [`ExtractionConfig`] - run behavior
//! - [`RunSummary`] / [`FileReport`] - counters

pub mod config;
pub mod error;
pub mod feedback;
pub mod fence;
pub mod metrics;
pub mod orchestrator;
pub mod prompt;

pub use config::{DEFAULT_MAX_ROUNDS, ExtractionConfig};
pub use error::ExtractionError;
pub use feedback::{
    SchemaValidator, ValidationIssue, ValidationResult, build_correction_message,
    format_tool_report, validate,
};
pub use fence::{CandidateObject, MISSING_MARKER, decode_candidates, parse_code_fences};
pub use metrics::{FileReport, RunSummary, estimate_tokens};
pub use orchestrator::{ExtractionOrchestrator, Source};
pub use prompt::PromptBuilder;
