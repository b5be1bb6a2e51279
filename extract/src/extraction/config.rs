//! Configuration for extraction runs.

use serde::{Deserialize, Serialize};

use crate::segment::{SegmentError, SegmentationConfig};

/// Default conversation round cap per segment.
pub const DEFAULT_MAX_ROUNDS: usize = 16;

/// Configuration for one extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Validate complete objects and ask for corrections (default: true).
    pub enforce_schema: bool,
    /// Expect several records per file rather than one (default: true).
    pub multiple_per_file: bool,
    /// Free-form tool usage instructions appended to the system prompt.
    pub tool_prompt: String,
    /// Round-trips allowed per segment conversation; `None` is unbounded.
    pub max_rounds: Option<usize>,
    /// Append "N calls left" to tool descriptions (default: true).
    pub quota_hints: bool,
    /// Persist each segment's conversation (default: false).
    pub log_raw: bool,
    /// Window sizes.
    pub segmentation: SegmentationConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enforce_schema: true,
            multiple_per_file: true,
            tool_prompt: String::new(),
            max_rounds: Some(DEFAULT_MAX_ROUNDS),
            quota_hints: true,
            log_raw: false,
            segmentation: SegmentationConfig::default(),
        }
    }
}

impl ExtractionConfig {
    /// Set whether complete objects are schema-checked.
    #[must_use]
    pub const fn with_enforce_schema(mut self, enforce: bool) -> Self {
        self.enforce_schema = enforce;
        self
    }

    /// Set the round cap.
    #[must_use]
    pub const fn with_max_rounds(mut self, max: Option<usize>) -> Self {
        self.max_rounds = max;
        self
    }

    /// Set whether transcripts are persisted.
    #[must_use]
    pub const fn with_log_raw(mut self, log_raw: bool) -> Self {
        self.log_raw = log_raw;
        self
    }

    /// Set the segmentation windows.
    #[must_use]
    pub const fn with_segmentation(mut self, segmentation: SegmentationConfig) -> Self {
        self.segmentation = segmentation;
        self
    }

    /// Set the tool usage instructions.
    #[must_use]
    pub fn with_tool_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.tool_prompt = prompt.into();
        self
    }

    /// Checks the windows and the round cap.
    ///
    /// # Errors
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        self.segmentation
            .validate()
            .map_err(|e: SegmentError| e.to_string())?;
        if self.max_rounds == Some(0) {
            return Err("max_rounds must be greater than 0".to_string());
        }
        Ok(())
    }
}
