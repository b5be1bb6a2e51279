use rig::completion::ToolDefinition;
use rig::tool::Tool;
use schemars::JsonSchema;
use segex_python::PythonSandbox;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ToolError, names, parameters_for};

/// Arguments for [`RunPythonTool`].
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct RunPythonArgs {
    /// Python 3 source. Print the values you need.
    pub code: String,
}

/// Runs screened Python in a time-boxed subprocess.
#[derive(Debug, Clone)]
pub struct RunPythonTool {
    sandbox: Arc<PythonSandbox>,
}

impl RunPythonTool {
    /// Wraps a discovered interpreter.
    #[must_use]
    pub const fn new(sandbox: Arc<PythonSandbox>) -> Self {
        Self { sandbox }
    }
}

impl Tool for RunPythonTool {
    const NAME: &'static str = names::RUN_PYTHON;
    type Error = ToolError;
    type Args = RunPythonArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        let modules: Vec<&str> = self
            .sandbox
            .config
            .allowed_modules
            .iter()
            .map(String::as_str)
            .collect();
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: format!(
                "Execute a short Python 3 script and return what it prints. \
                 Use it for arithmetic, date handling and string processing. \
                 Only these modules can be imported: {}. \
                 File, network and introspection access is blocked and the run is limited to {} ms.",
                modules.join(", "),
                self.sandbox.config.timeout.as_millis()
            ),
            parameters: parameters_for::<RunPythonArgs>(),
        }
    }

    async fn call(&self, args: RunPythonArgs) -> Result<String, ToolError> {
        Ok(self.sandbox.execute(&args.code).await)
    }
}
