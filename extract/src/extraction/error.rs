//! Error types for extraction runs.

use thiserror::Error;

use crate::document::DocumentError;
use crate::driver::DriverError;
use crate::sink::SinkError;

/// Errors that abort a file (or, for `SchemaError`, the whole run).
///
/// Validation failures, tool errors and round-cap exhaustion never appear
/// here; they are resolved inside the conversation.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Schema compilation failed.
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// The document could not be read or segmented.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// The document kind has no reader.
    #[error("Unsupported document type: {0}")]
    Unsupported(String),

    /// The endpoint failed or the conversation could not continue.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// A record or transcript could not be written.
    #[error(transparent)]
    Sink(#[from] SinkError),
}
