//! Locates a Python 3 interpreter on the host system.

use crate::error::SandboxError;
use std::path::PathBuf;
use which::which;

/// Environment variable that overrides the interpreter path.
pub const PYTHON_BIN_ENV_VAR: &str = "SEGEX_PYTHON_BIN";

/// Locates the Python interpreter.
///
/// Resolution order:
/// 1. `explicit_path` if provided and the file exists.
/// 2. The path in the `SEGEX_PYTHON_BIN` environment variable.
/// 3. `python3`, then `python`, resolved via `$PATH`.
/// 4. Common install location fallbacks (platform-specific).
///
/// # Errors
///
/// Returns `SandboxError::ExecutableNotFound` when no interpreter can be
/// located.
pub fn discover_python(explicit_path: Option<PathBuf>) -> Result<PathBuf, SandboxError> {
    if let Some(path) = explicit_path {
        if path.exists() {
            return Ok(path);
        }
        return Err(SandboxError::ExecutableNotFound(format!(
            "Explicit path does not exist: {}",
            path.display()
        )));
    }

    if let Ok(path_str) = std::env::var(PYTHON_BIN_ENV_VAR) {
        let path = PathBuf::from(path_str);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(
            event = "python_env_override_missing",
            path = %path.display(),
            "{PYTHON_BIN_ENV_VAR} points at a missing file, continuing search"
        );
    }

    for name in ["python3", "python"] {
        if let Ok(path) = which(name) {
            return Ok(path);
        }
    }

    if let Some(location) = fallback_locations().into_iter().find(|l| l.exists()) {
        return Ok(location);
    }

    Err(SandboxError::ExecutableNotFound(
        "python3 not found. Install Python 3 or set SEGEX_PYTHON_BIN.\n\
         Searched: PATH, common install locations."
            .to_string(),
    ))
}

#[cfg(unix)]
fn fallback_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(home) = dirs::home_dir() {
        locations.push(home.join(".local/bin/python3"));
        locations.push(home.join(".pyenv/shims/python3"));
    }
    locations.push(PathBuf::from("/usr/local/bin/python3"));
    locations.push(PathBuf::from("/usr/bin/python3"));
    locations
}

#[cfg(windows)]
fn fallback_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(local) = dirs::data_local_dir() {
        locations.push(local.join("Programs/Python/Python312/python.exe"));
        locations.push(local.join("Programs/Python/Python311/python.exe"));
    }
    locations.push(PathBuf::from(r"C:\Python312\python.exe"));
    locations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let result = discover_python(Some(PathBuf::from("/definitely/not/here/python3")));
        assert!(matches!(result, Err(SandboxError::ExecutableNotFound(msg)) if msg.contains("Explicit path")));
    }
}
