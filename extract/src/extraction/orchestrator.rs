//! The per-file, per-segment extraction state machine.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

use super::config::ExtractionConfig;
use super::error::ExtractionError;
use super::feedback::{SchemaValidator, build_correction_message};
use super::fence::{CandidateObject, decode_candidates};
use super::metrics::{FileReport, RunSummary, estimate_tokens};
use super::prompt::PromptBuilder;
use crate::backend::ChatBackend;
use crate::chat::Message;
use crate::conversation::Conversation;
use crate::document::{Document, DocumentKind, Segment, load_document};
use crate::driver::{ConversationDriver, ExchangeOutcome};
use crate::sink::ResultSink;
use crate::tools::{ToolBox, ToolLimits, ToolRegistry};
use crate::worker::{ExtractionEvent, StopHandle};

/// One input of a run: a path still to be read, or a document a reader
/// already produced.
#[derive(Debug, Clone)]
pub enum Source {
    /// Read and segment when its turn comes.
    Path(PathBuf),
    /// Already segmented.
    Document(Document),
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<Document> for Source {
    fn from(document: Document) -> Self {
        Self::Document(document)
    }
}

impl Source {
    fn label(&self) -> String {
        match self {
            Self::Path(path) => path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned()),
            Self::Document(doc) => doc.display_name(),
        }
    }
}

/// How processing of one file ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Completed,
    Stopped,
}

/// What one segment produced.
#[derive(Debug, Default)]
struct SegmentResult {
    accepted: Vec<String>,
    partials: Vec<CandidateObject>,
}

/// Runs documents through segment conversations and persists what the model
/// extracts.
///
/// Files are processed one at a time and segments strictly in order. A
/// failure abandons the rest of its file and the run continues with the
/// next one.
pub struct ExtractionOrchestrator {
    backend: Arc<dyn ChatBackend>,
    validator: Arc<SchemaValidator>,
    sink: Arc<dyn ResultSink>,
    toolbox: ToolBox,
    limits: ToolLimits,
    config: ExtractionConfig,
}

impl ExtractionOrchestrator {
    /// Orchestrator with no tools and the default configuration.
    #[must_use]
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        validator: Arc<SchemaValidator>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            backend,
            validator,
            sink,
            toolbox: ToolBox::new(),
            limits: ToolLimits::none(),
            config: ExtractionConfig::default(),
        }
    }

    /// Sets the run configuration.
    #[must_use]
    pub fn with_config(mut self, config: ExtractionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the tools and their per-file quotas.
    #[must_use]
    pub fn with_tools(mut self, toolbox: ToolBox, limits: ToolLimits) -> Self {
        self.toolbox = toolbox;
        self.limits = limits;
        self
    }

    /// Run configuration.
    #[must_use]
    pub const fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Processes every source in order and returns the run totals.
    ///
    /// `Progress` is emitted after each file whatever its outcome. The stop
    /// flag is checked before each file and before each segment; an
    /// in-flight model call or tool run always completes first.
    pub async fn run(
        &self,
        sources: Vec<Source>,
        events: &UnboundedSender<ExtractionEvent>,
        stop: &StopHandle,
    ) -> RunSummary {
        let start = Instant::now();
        let total = sources.len();
        let mut summary = RunSummary {
            files_total: total,
            ..RunSummary::default()
        };

        if let Err(reason) = self.config.validate() {
            let _ = events.send(ExtractionEvent::Error(format!("Invalid configuration: {reason}")));
            summary.wall_time = start.elapsed();
            return summary;
        }

        let mut registry = ToolRegistry::new(&self.toolbox, &self.limits);
        tracing::info!(event = "run_started", files = total, tools = self.toolbox.len());

        for (i, source) in sources.into_iter().enumerate() {
            if stop.is_stopped() {
                summary.stopped = true;
                break;
            }

            let label = source.label();
            emit_log(events, format!("Processing: {label}"));
            registry.reset(&self.limits);

            let mut report = FileReport::default();
            let result = self
                .process_source(source, &mut registry, &mut report, events, stop)
                .await;
            report.tool_calls = registry.calls();
            summary.absorb(&report);

            match result {
                Ok(FileOutcome::Completed) => {
                    summary.files_completed += 1;
                    emit_log(events, "  > File Finished.".to_string());
                    tracing::info!(
                        event = "file_finished",
                        file = %label,
                        records = report.records_written,
                        rounds = report.rounds,
                        tool_calls = report.tool_calls,
                        corrections = report.corrections,
                    );
                }
                Ok(FileOutcome::Stopped) => {
                    summary.stopped = true;
                }
                Err(e) => {
                    summary.files_failed += 1;
                    tracing::error!(event = "file_failed", file = %label, error = %e);
                    emit_log(events, format!("Error processing {label}: {e}"));
                }
            }

            let _ = events.send(ExtractionEvent::Progress {
                current: i + 1,
                total,
            });
            if summary.stopped {
                break;
            }
        }

        if summary.stopped {
            emit_log(events, "Stopped.".to_string());
        }
        summary.wall_time = start.elapsed();
        tracing::info!(
            event = "run_finished",
            completed = summary.files_completed,
            failed = summary.files_failed,
            records = summary.records_written,
            stopped = summary.stopped,
            elapsed_ms = u64::try_from(summary.wall_time.as_millis()).unwrap_or(u64::MAX),
        );
        summary
    }

    async fn process_source(
        &self,
        source: Source,
        registry: &mut ToolRegistry<'_>,
        report: &mut FileReport,
        events: &UnboundedSender<ExtractionEvent>,
        stop: &StopHandle,
    ) -> Result<FileOutcome, ExtractionError> {
        let document = match source {
            Source::Path(path) => load_document(&path, &self.config.segmentation)?,
            Source::Document(document) => document,
        };
        self.process_document(&document, registry, report, events, stop)
            .await
    }

    /// Runs every segment of one document, persisting after each.
    async fn process_document(
        &self,
        document: &Document,
        registry: &mut ToolRegistry<'_>,
        report: &mut FileReport,
        events: &UnboundedSender<ExtractionEvent>,
        stop: &StopHandle,
    ) -> Result<FileOutcome, ExtractionError> {
        if document.kind() == DocumentKind::Unsupported || document.segments().is_empty() {
            return Err(ExtractionError::Unsupported(document.display_name()));
        }

        let stem = document.stem();
        let mut carry: Vec<CandidateObject> = Vec::new();
        let mut written = 0usize;

        for segment in document.segments() {
            if stop.is_stopped() {
                return Ok(FileOutcome::Stopped);
            }

            let carry_text: String = carry.iter().map(CandidateObject::fenced).collect();
            let (result, conversation) = self
                .process_segment(document, segment, &carry_text, registry, report)
                .await?;

            for record in &result.accepted {
                written += 1;
                self.sink.write_record(&stem, written, record).await?;
            }
            report.records_written += result.accepted.len();

            if self.config.log_raw {
                self.sink
                    .write_transcript(&stem, segment.index, &conversation.to_transcript())
                    .await?;
            }

            carry = result.partials;
            report.segments_done += 1;
            if segment.total > 1 {
                emit_log(
                    events,
                    format!("  > Extracted Parts {} / {}", segment.number(), segment.total),
                );
            }
        }

        if !carry.is_empty() {
            tracing::warn!(
                event = "unresolved_partials_persisted",
                file = %document.display_name(),
                count = carry.len(),
            );
            for partial in &carry {
                written += 1;
                self.sink.write_record(&stem, written, &partial.raw).await?;
            }
            report.records_written += carry.len();
            report.forced_partials += carry.len();
        }

        Ok(FileOutcome::Completed)
    }

    /// Runs the validation-retry loop of one segment.
    ///
    /// Partial objects are deferred without validation. Each complete object
    /// that fails the schema gets its own correction message and the
    /// conversation continues; the original prompt is never re-sent. Only
    /// the objects accepted in the last answered round are kept, since a
    /// correction asks the model to answer again in full. The loop ends when
    /// a round yields no failures, the round cap is spent, or the driver
    /// stops early.
    async fn process_segment(
        &self,
        document: &Document,
        segment: &Segment,
        carry: &str,
        registry: &mut ToolRegistry<'_>,
        report: &mut FileReport,
    ) -> Result<(SegmentResult, Conversation), ExtractionError> {
        let prompts = PromptBuilder::new(
            self.validator.schema(),
            &self.config.tool_prompt,
            self.config.multiple_per_file,
        );
        let system = prompts.system(segment);
        let user = PromptBuilder::user(&document.display_name(), segment, carry);
        report.estimated_prompt_tokens += estimate_tokens(&system) + estimate_tokens(&user.text());

        let mut conversation = Conversation::new(Message::system(system), user);
        let driver = ConversationDriver::new(
            self.backend.as_ref(),
            self.config.max_rounds,
            self.config.quota_hints,
        );
        let mut result = SegmentResult::default();

        loop {
            let outcome = driver.exchange(&mut conversation, registry).await?;
            let ExchangeOutcome::Final(content) = outcome else {
                break;
            };

            let mut accepted = Vec::new();
            let mut corrections = Vec::new();
            let mut partials = Vec::new();

            for candidate in decode_candidates(&content) {
                if candidate.partial {
                    partials.push(candidate);
                    continue;
                }
                if self.config.enforce_schema {
                    let check = self.validator.validate(&candidate.raw);
                    if !check.valid {
                        tracing::debug!(
                            event = "candidate_rejected",
                            segment = segment.number(),
                            errors = check.errors.len(),
                        );
                        corrections.push(build_correction_message(&candidate.raw, &check));
                        continue;
                    }
                }
                accepted.push(candidate.raw);
            }

            result.accepted = accepted;
            if !partials.is_empty() {
                result.partials = partials;
            }
            if corrections.is_empty() {
                break;
            }
            if driver.rounds_exhausted(&conversation) {
                tracing::warn!(
                    event = "corrections_abandoned",
                    segment = segment.number(),
                    rejected = corrections.len(),
                );
                break;
            }

            report.corrections += corrections.len();
            for correction in corrections {
                conversation.push(Message::user(correction));
            }
        }

        report.rounds += conversation.rounds();
        tracing::debug!(
            event = "segment_done",
            segment = segment.number(),
            total = segment.total,
            accepted = result.accepted.len(),
            partials = result.partials.len(),
            rounds = conversation.rounds(),
        );
        Ok((result, conversation))
    }
}

fn emit_log(events: &UnboundedSender<ExtractionEvent>, message: String) {
    tracing::info!("{message}");
    let _ = events.send(ExtractionEvent::Log(message));
}
