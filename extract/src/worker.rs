//! Runs an extraction on its own thread and reports back through events.
//!
//! The caller keeps a [`WorkerHandle`]: it reads [`ExtractionEvent`]s from
//! it, can request a stop at any time, and joins the thread at the end. All
//! work on the worker is sequential.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::extraction::metrics::RunSummary;
use crate::extraction::orchestrator::{ExtractionOrchestrator, Source};

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "segex-worker";

/// Signals sent from the worker to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionEvent {
    /// `current` of `total` files handled.
    Progress {
        /// Files handled so far.
        current: usize,
        /// Files in the run.
        total: usize,
    },
    /// A human-readable status line.
    Log(String),
    /// The run could not start.
    Error(String),
    /// Always the last event.
    Finished(RunSummary),
}

/// Cooperative stop flag shared between the caller and the worker.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// A flag that is not set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. Takes effect at the next file or segment boundary.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The caller's side of a running worker.
pub struct WorkerHandle {
    stop: StopHandle,
    events: UnboundedReceiver<ExtractionEvent>,
    thread: JoinHandle<RunSummary>,
}

impl WorkerHandle {
    /// Requests a stop.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// A clone of the stop flag, e.g. for a signal handler.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Event stream; ends after [`ExtractionEvent::Finished`].
    pub fn events(&mut self) -> &mut UnboundedReceiver<ExtractionEvent> {
        &mut self.events
    }

    /// Waits for the worker thread and returns the run totals.
    ///
    /// # Errors
    /// Returns the panic payload if the worker panicked.
    pub fn join(self) -> std::thread::Result<RunSummary> {
        self.thread.join()
    }
}

/// Starts `orchestrator` on a dedicated thread with its own single-threaded
/// Tokio runtime.
///
/// # Errors
/// Returns an error when the OS refuses to create the thread.
pub fn spawn_worker(
    orchestrator: ExtractionOrchestrator,
    sources: Vec<Source>,
) -> std::io::Result<WorkerHandle> {
    let (tx, rx) = mpsc::unbounded_channel();
    let stop = StopHandle::new();
    let worker_stop = stop.clone();

    let thread = std::thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || {
            let files_total = sources.len();
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::error!(event = "worker_runtime_failed", error = %e);
                    let _ = tx.send(ExtractionEvent::Error(format!(
                        "Failed to start worker runtime: {e}"
                    )));
                    let summary = RunSummary {
                        files_total,
                        ..RunSummary::default()
                    };
                    let _ = tx.send(ExtractionEvent::Finished(summary.clone()));
                    return summary;
                }
            };

            let summary = runtime.block_on(orchestrator.run(sources, &tx, &worker_stop));
            let _ = tx.send(ExtractionEvent::Finished(summary.clone()));
            summary
        })?;

    Ok(WorkerHandle {
        stop,
        events: rx,
        thread,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_handle_is_shared() {
        let stop = StopHandle::new();
        let other = stop.clone();
        assert!(!other.is_stopped());
        stop.stop();
        assert!(other.is_stopped());
    }
}
