#![warn(clippy::pedantic)]
//! Screened, time-boxed execution of model-supplied Python snippets.
//!
//! A snippet goes through two gates before any output is returned:
//! [`screen::screen_source`] rejects imports outside the allow-list and
//! forbidden names, then [`process::run_script`] runs it in an isolated
//! interpreter process under a hard wall-clock limit.
pub mod cmd;
pub mod discovery;
pub mod error;
pub mod process;
pub mod screen;
pub mod types;

use std::path::PathBuf;
use tokio::process::Command;

pub use discovery::discover_python;
pub use error::SandboxError;
pub use process::run_script;
pub use screen::{screen_source, PolicyViolation};
pub use types::*;

/// A located interpreter plus the policy applied to every snippet.
#[derive(Debug, Clone)]
pub struct PythonSandbox {
    /// Interpreter binary.
    pub path: PathBuf,
    /// Screening rules and limits.
    pub config: SandboxConfig,
}

impl PythonSandbox {
    /// Wraps `path` with the default policy.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            config: SandboxConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SandboxConfig) -> Self {
        self.config = config;
        self
    }

    /// Discovers an interpreter and wraps it with the default policy.
    ///
    /// # Errors
    /// Returns an error when no interpreter can be located.
    pub fn discover(explicit_path: Option<PathBuf>) -> Result<Self, SandboxError> {
        discover_python(explicit_path).map(Self::new)
    }

    /// Checks that the interpreter starts and reports a Python 3 version.
    ///
    /// # Errors
    /// Returns an error if the binary cannot be executed or is not Python 3.
    pub async fn check_health(&self) -> Result<String, SandboxError> {
        let output = Command::new(&self.path)
            .arg("--version")
            .output()
            .await
            .map_err(|e| SandboxError::SpawnFailed {
                stage: "health".to_string(),
                source: e,
            })?;

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() && version.starts_with("Python 3") {
            Ok(version)
        } else {
            Err(SandboxError::Unhealthy(format!(
                "{} --version returned '{version}'",
                self.path.display()
            )))
        }
    }

    /// Screens and runs `code`.
    ///
    /// # Errors
    /// Returns the policy violation, spawn failure or timeout.
    pub async fn run(&self, code: &str) -> Result<RunResult, SandboxError> {
        run_script(&self.path, code, &self.config).await
    }

    /// Runs `code` and renders every outcome, including failures, as the
    /// text a tool caller receives.
    pub async fn execute(&self, code: &str) -> String {
        match self.run(code).await {
            Ok(result) => result.to_tool_output(),
            Err(SandboxError::Policy(violation)) => {
                format!("Error: Code rejected by sandbox policy: {violation}.")
            }
            Err(SandboxError::Timeout { .. }) => format!(
                "Error: Code execution timed out after {}.",
                describe_limit(self.config.timeout)
            ),
            Err(e) => format!("Error: {e}"),
        }
    }
}

fn describe_limit(limit: std::time::Duration) -> String {
    let millis = limit.as_millis();
    match millis {
        1000 => "1 second".to_string(),
        m if m % 1000 == 0 => format!("{} seconds", m / 1000),
        m => format!("{m} milliseconds"),
    }
}
