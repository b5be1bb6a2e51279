//! Counters for files and whole runs, plus token estimation.

use serde::Serialize;
use std::time::Duration;

/// What happened to one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileReport {
    /// Segments fully processed.
    pub segments_done: usize,
    /// Records persisted.
    pub records_written: usize,
    /// Model round-trips across all segments.
    pub rounds: usize,
    /// Tool calls serviced.
    pub tool_calls: usize,
    /// Correction messages sent.
    pub corrections: usize,
    /// Partial objects persisted after the last segment.
    pub forced_partials: usize,
    /// Estimated prompt tokens of the opening messages.
    pub estimated_prompt_tokens: usize,
}

/// Totals for a run, delivered with the `Finished` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Files handed to the run.
    pub files_total: usize,
    /// Files processed without error.
    pub files_completed: usize,
    /// Files abandoned after an error.
    pub files_failed: usize,
    /// Whether a stop request ended the run early.
    pub stopped: bool,
    /// Records persisted.
    pub records_written: usize,
    /// Model round-trips.
    pub rounds: usize,
    /// Tool calls serviced.
    pub tool_calls: usize,
    /// Correction messages sent.
    pub corrections: usize,
    /// Wall-clock duration.
    pub wall_time: Duration,
}

impl RunSummary {
    /// Adds a file's counters.
    pub fn absorb(&mut self, report: &FileReport) {
        self.records_written += report.records_written;
        self.rounds += report.rounds;
        self.tool_calls += report.tool_calls;
        self.corrections += report.corrections;
    }
}

/// Estimate token count from text using the standard 4-chars-per-token heuristic.
///
/// Uses `chars().count()` to handle UTF-8 correctly (not `len()` which counts bytes).
///
/// # Examples
///
/// ```
/// use segex_extract::extraction::estimate_tokens;
///
/// assert_eq!(estimate_tokens("hello"), 2);
/// assert_eq!(estimate_tokens("hello world"), 3);
/// ```
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}
