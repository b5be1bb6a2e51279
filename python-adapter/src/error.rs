use thiserror::Error;

use crate::screen::PolicyViolation;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Python interpreter not found: {0}")]
    ExecutableNotFound(String),

    #[error("Source rejected by sandbox policy: {0}")]
    Policy(#[from] PolicyViolation),

    #[error("Failed to prepare script file: {0}")]
    ScriptFile(#[source] std::io::Error),

    #[error("Process failed at {stage}: {source}")]
    SpawnFailed {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Output reader failed at {stage}: {source}")]
    StreamFailed {
        stage: String,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("Child process exposed no {0} handle")]
    MissingHandle(&'static str),

    #[error("Output exceeded {limit_bytes} bytes (captured {captured_bytes})")]
    OutputTruncated {
        captured_bytes: usize,
        limit_bytes: usize,
    },

    #[error("Process {pid} timed out after {elapsed:?}")]
    Timeout {
        elapsed: std::time::Duration,
        pid: u32,
    },

    #[error("Failed to send {signal} to {pid}: {reason}")]
    SignalFailed {
        signal: String,
        pid: u32,
        reason: String,
    },

    #[error("Health check failed: {0}")]
    Unhealthy(String),
}
