use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Modules a submitted script may import.
pub const DEFAULT_ALLOWED_MODULES: &[&str] = &["datetime", "math", "json", "re", "decimal", "copy"];

/// Identifiers that are rejected wherever they appear as a name.
pub const DEFAULT_FORBIDDEN_NAMES: &[&str] = &[
    "eval",
    "exec",
    "compile",
    "open",
    "input",
    "getattr",
    "help",
    "globals",
    "locals",
    "vars",
    "dir",
    "breakpoint",
    "sys",
    "modules",
    "builtins",
    "codecs",
    "posix",
];

/// Raw character sequences rejected anywhere in the source, including literals.
pub const DEFAULT_FORBIDDEN_MARKERS: &[&str] = &["__", "@"];

/// Name substituted for the temporary script path in captured output.
pub const SCRUBBED_SCRIPT_NAME: &str = "tmp.py";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub timeout: Duration,
    pub allowed_modules: BTreeSet<String>,
    pub forbidden_names: BTreeSet<String>,
    pub forbidden_markers: Vec<String>,
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            allowed_modules: DEFAULT_ALLOWED_MODULES
                .iter()
                .map(ToString::to_string)
                .collect(),
            forbidden_names: DEFAULT_FORBIDDEN_NAMES
                .iter()
                .map(ToString::to_string)
                .collect(),
            forbidden_markers: DEFAULT_FORBIDDEN_MARKERS
                .iter()
                .map(ToString::to_string)
                .collect(),
            max_output_bytes: 64 * 1024,
        }
    }
}

impl SandboxConfig {
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl RunResult {
    /// Renders the result the way a tool caller reads it: stdout, then any
    /// stderr prefixed with `Error:`, then an exit note when stderr was silent.
    #[must_use]
    pub fn to_tool_output(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.trim().is_empty() {
            out.push_str("\nError: ");
            out.push_str(&self.stderr);
        } else if self.exit_code != 0 {
            out.push_str(&format!(
                "\nProcess exited with non-zero status code {}",
                self.exit_code
            ));
        }
        out.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(stdout: &str, stderr: &str, exit_code: i32) -> RunResult {
        RunResult {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
            duration_ms: 3,
        }
    }

    #[test]
    fn test_tool_output_plain_stdout() {
        assert_eq!(result("42\n", "", 0).to_tool_output(), "42");
    }

    #[test]
    fn test_tool_output_appends_stderr() {
        let out = result("partial", "NameError: x", 1).to_tool_output();
        assert_eq!(out, "partial\nError: NameError: x");
    }

    #[test]
    fn test_tool_output_reports_silent_failure() {
        let out = result("", "", 3).to_tool_output();
        assert_eq!(out, "Process exited with non-zero status code 3");
    }

    #[test]
    fn test_default_allow_list() {
        let config = SandboxConfig::default();
        assert!(config.allowed_modules.contains("math"));
        assert!(!config.allowed_modules.contains("os"));
        assert_eq!(config.timeout, Duration::from_secs(1));
    }
}
