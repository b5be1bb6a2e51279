use thiserror::Error;

/// Errors raised while preparing a run.
#[derive(Debug, Error)]
pub enum CliError {
    /// A configuration value is missing or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The configuration file is not valid TOML for this tool.
    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
