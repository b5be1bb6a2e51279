#![deny(missing_docs)]
//! Configuration and wiring behind the `segex` binary.
//!
//! The binary reads a TOML file into [`config::AppConfig`], applies command
//! line overrides, and hands the result to [`setup::build_orchestrator`].

/// TOML configuration and command-line overrides.
pub mod config;
/// Error types for the binary.
pub mod errors;
/// Builds the orchestrator, toolbox and sandbox from a configuration.
pub mod setup;

pub use config::{AppConfig, Overrides};
pub use errors::CliError;
