//! Where accepted records and transcripts go.
//!
//! Records are written one at a time as they are accepted, never batched at
//! the end of a file.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Persistence failures. Each one aborts the current file.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Filesystem write failed.
    #[error("Failed to write {path}: {source}")]
    Io {
        /// Target file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A transcript could not be serialized.
    #[error("Failed to serialize transcript: {0}")]
    Serialize(#[from] serde_json::Error),

    /// In-memory store is unusable.
    #[error("Result store unavailable: {0}")]
    Unavailable(String),
}

/// File name of the `n`th record of `stem`, counting from 1.
#[must_use]
pub fn record_file_name(stem: &str, n: usize) -> String {
    format!("{stem}_{n}.json")
}

/// File name of the transcript of segment `index` (0-based) of `stem`.
#[must_use]
pub fn transcript_file_name(stem: &str, index: usize) -> String {
    format!("{stem}_segment{index}_log.json")
}

/// Destination for extraction output.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Stores the `n`th accepted record of the file with stem `stem`.
    async fn write_record(&self, stem: &str, n: usize, content: &str) -> Result<(), SinkError>;

    /// Stores the conversation of segment `index` of the file.
    async fn write_transcript(&self, stem: &str, index: usize, transcript: &Value)
    -> Result<(), SinkError>;
}

/// Writes into a directory.
#[derive(Debug, Clone)]
pub struct FsSink {
    dir: PathBuf,
    pretty: bool,
}

impl FsSink {
    /// Sink writing into `dir`, which is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, pretty: bool) -> Self {
        Self {
            dir: dir.into(),
            pretty,
        }
    }

    /// Target directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn render(&self, content: &str) -> String {
        if !self.pretty {
            return content.to_string();
        }
        serde_json::from_str::<Value>(content)
            .ok()
            .and_then(|v| serde_json::to_string_pretty(&v).ok())
            .unwrap_or_else(|| content.to_string())
    }

    async fn write(&self, name: String, body: String) -> Result<(), SinkError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SinkError::Io {
                path: self.dir.clone(),
                source,
            })?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, body)
            .await
            .map_err(|source| SinkError::Io {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(event = "output_written", path = %path.display());
        Ok(())
    }
}

#[async_trait]
impl ResultSink for FsSink {
    async fn write_record(&self, stem: &str, n: usize, content: &str) -> Result<(), SinkError> {
        self.write(record_file_name(stem, n), self.render(content)).await
    }

    async fn write_transcript(
        &self,
        stem: &str,
        index: usize,
        transcript: &Value,
    ) -> Result<(), SinkError> {
        let body = serde_json::to_string_pretty(transcript)?;
        self.write(transcript_file_name(stem, index), body).await
    }
}

/// Keeps everything in memory, keyed by the file names [`FsSink`] would use.
///
/// Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<(String, String)>>>,
    transcripts: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MemorySink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `(file name, content)` of every record, in write order.
    #[must_use]
    pub fn records(&self) -> Vec<(String, String)> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// `(file name, transcript)` of every transcript, in write order.
    #[must_use]
    pub fn transcripts(&self) -> Vec<(String, Value)> {
        self.transcripts.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn write_record(&self, stem: &str, n: usize, content: &str) -> Result<(), SinkError> {
        self.records
            .lock()
            .map_err(|e| SinkError::Unavailable(e.to_string()))?
            .push((record_file_name(stem, n), content.to_string()));
        Ok(())
    }

    async fn write_transcript(
        &self,
        stem: &str,
        index: usize,
        transcript: &Value,
    ) -> Result<(), SinkError> {
        self.transcripts
            .lock()
            .map_err(|e| SinkError::Unavailable(e.to_string()))?
            .push((transcript_file_name(stem, index), transcript.clone()));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fs_sink_names_and_pretty_printing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let sink = FsSink::new(&out, true);

        sink.write_record("invoice", 1, r#"{"id":5}"#).await.unwrap();
        sink.write_record("invoice", 2, "not json").await.unwrap();
        sink.write_transcript("invoice", 0, &json!([{"role": "user"}]))
            .await
            .unwrap();

        let first = std::fs::read_to_string(out.join("invoice_1.json")).unwrap();
        assert_eq!(first, "{\n  \"id\": 5\n}");
        let second = std::fs::read_to_string(out.join("invoice_2.json")).unwrap();
        assert_eq!(second, "not json");
        assert!(out.join("invoice_segment0_log.json").exists());
    }

    #[tokio::test]
    async fn test_fs_sink_verbatim_when_not_pretty() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsSink::new(dir.path(), false);
        sink.write_record("a", 1, r#"{"id":5}"#).await.unwrap();
        let body = std::fs::read_to_string(dir.path().join("a_1.json")).unwrap();
        assert_eq!(body, r#"{"id":5}"#);
    }

    #[tokio::test]
    async fn test_memory_sink_shares_storage() {
        let sink = MemorySink::new();
        let handle = sink.clone();
        sink.write_record("a", 1, "{}").await.unwrap();
        assert_eq!(handle.records(), vec![("a_1.json".to_string(), "{}".to_string())]);
    }
}
