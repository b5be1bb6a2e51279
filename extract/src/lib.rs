//! Segmented, tool-augmented structured extraction.
//!
//! Documents are split into overlapping segments. Each segment is sent to a
//! chat-completion model together with a JSON Schema, the model may call a
//! small set of quota-limited tools, and every complete object it returns is
//! validated and corrected in-conversation before it is persisted. Objects
//! the model marks as incomplete are carried into the next segment's prompt.

pub mod backend;
pub mod chat;
pub mod conversation;
pub mod document;
pub mod driver;
pub mod extraction;
pub mod openai;
pub mod segment;
pub mod sink;
pub mod tools;
pub mod worker;

/// Common types for driving an extraction run.
pub mod prelude {
    pub use crate::backend::{BackendError, ChatBackend, ScriptedBackend};
    pub use crate::document::{Document, DocumentKind, load_document};
    pub use crate::extraction::{
        ExtractionConfig, ExtractionError, ExtractionOrchestrator, RunSummary, SchemaValidator,
        Source,
    };
    pub use crate::openai::{ModelSettings, OpenAiBackend};
    pub use crate::segment::SegmentationConfig;
    pub use crate::sink::{FsSink, MemorySink, ResultSink};
    pub use crate::tools::{BuiltinTool, ToolBox, ToolLimits};
    pub use crate::worker::{ExtractionEvent, StopHandle, WorkerHandle, spawn_worker};
}
