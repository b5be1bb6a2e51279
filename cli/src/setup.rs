use anyhow::Context;
use segex_extract::extraction::{ExtractionOrchestrator, SchemaValidator};
use segex_extract::openai::OpenAiBackend;
use segex_extract::sink::FsSink;
use segex_extract::tools::names::{RUN_PYTHON, SCHEMA_CHECK, THINK, WEB_FETCH};
use segex_extract::tools::{
    BuiltinTool, RunPythonTool, SchemaCheckTool, ThinkTool, ToolBox, ToolLimits, WebFetchTool,
};
use segex_python::PythonSandbox;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;

/// Reads and compiles the schema file.
///
/// # Errors
/// Returns an error if the file is missing, not JSON, or not a valid schema.
pub fn load_validator(path: &Path) -> anyhow::Result<SchemaValidator> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read schema file {}", path.display()))?;
    let schema: Value = serde_json::from_str(&text)
        .with_context(|| format!("Schema file {} is not valid JSON", path.display()))?;
    Ok(SchemaValidator::new(schema)?)
}

/// Builds the tools whose configured limit is positive.
///
/// When no Python interpreter can be found, `run_python` is left out and
/// its limit set to zero so it is never advertised.
#[must_use]
pub fn build_toolbox(config: &AppConfig, validator: &Arc<SchemaValidator>) -> (ToolBox, ToolLimits) {
    let mut limits = config.method.tools.clone();
    let mut toolbox = ToolBox::new();

    if limits.get(RUN_PYTHON) > 0 {
        match PythonSandbox::discover(config.sandbox.python.clone()) {
            Ok(sandbox) => {
                tracing::info!(event = "python_found", path = %sandbox.path.display());
                let sandbox = sandbox.with_config(config.sandbox_config());
                toolbox = toolbox.with(BuiltinTool::RunPython(RunPythonTool::new(Arc::new(sandbox))));
            }
            Err(e) => {
                tracing::warn!(event = "python_unavailable", error = %e, "run_python disabled");
                limits = limits.with(RUN_PYTHON, 0);
            }
        }
    }
    if limits.get(WEB_FETCH) > 0 {
        toolbox = toolbox.with(BuiltinTool::WebFetch(WebFetchTool::new()));
    }
    if limits.get(THINK) > 0 {
        toolbox = toolbox.with(BuiltinTool::Think(ThinkTool));
    }
    if limits.get(SCHEMA_CHECK) > 0 {
        toolbox = toolbox.with(BuiltinTool::SchemaCheck(SchemaCheckTool::new(Arc::clone(
            validator,
        ))));
    }
    (toolbox, limits)
}

/// Wires backend, schema, tools and output directory into an orchestrator.
///
/// # Errors
/// Returns an error if the configuration is invalid or the schema cannot
/// be loaded.
pub fn build_orchestrator(config: &AppConfig) -> anyhow::Result<ExtractionOrchestrator> {
    config.validate()?;
    let schema_path = config
        .schema
        .path
        .as_deref()
        .context("schema.path is required")?;
    let validator = Arc::new(load_validator(schema_path)?);

    let backend = OpenAiBackend::new(config.model_settings()?)?;
    let (toolbox, limits) = build_toolbox(config, &validator);
    let sink = FsSink::new(&config.output.folder, config.output.pretty);

    tracing::info!(
        event = "orchestrator_ready",
        model = %config.model.settings.model,
        tools = toolbox.len(),
        output = %config.output.folder.display(),
    );

    Ok(
        ExtractionOrchestrator::new(Arc::new(backend), validator, Arc::new(sink))
            .with_config(config.extraction())
            .with_tools(toolbox, limits),
    )
}
