use rig::completion::ToolDefinition;
use rig::tool::Tool;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::{ToolError, names, parameters_for};
use crate::extraction::feedback::{SchemaValidator, format_tool_report};

/// Arguments for [`SchemaCheckTool`].
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct SchemaCheckArgs {
    /// The candidate object, as a JSON string or as an inline JSON value.
    pub data: Value,
}

/// Lets the model check a draft object against the run's schema before
/// answering.
#[derive(Debug, Clone)]
pub struct SchemaCheckTool {
    validator: Arc<SchemaValidator>,
}

impl SchemaCheckTool {
    /// Wraps the run's validator.
    #[must_use]
    pub const fn new(validator: Arc<SchemaValidator>) -> Self {
        Self { validator }
    }
}

impl Tool for SchemaCheckTool {
    const NAME: &'static str = names::SCHEMA_CHECK;
    type Error = ToolError;
    type Args = SchemaCheckArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Validate a JSON object against the extraction schema. \
                          Pass the object in `data`; every schema violation is listed with its path."
                .to_string(),
            parameters: parameters_for::<SchemaCheckArgs>(),
        }
    }

    async fn call(&self, args: SchemaCheckArgs) -> Result<String, ToolError> {
        let result = match &args.data {
            Value::String(raw) => self.validator.validate(raw),
            value => self.validator.validate_value(value),
        };
        Ok(format_tool_report(&result))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool() -> SchemaCheckTool {
        let schema = json!({
            "type": "object",
            "properties": {"id": {"type": "integer"}},
            "required": ["id"]
        });
        SchemaCheckTool::new(Arc::new(SchemaValidator::new(schema).unwrap()))
    }

    #[tokio::test]
    async fn test_string_and_inline_data() {
        let ok = tool()
            .call(SchemaCheckArgs {
                data: json!("{\"id\": 1}"),
            })
            .await
            .unwrap();
        assert!(ok.starts_with("Validation succeeded"));

        let bad = tool()
            .call(SchemaCheckArgs {
                data: json!({"id": "x"}),
            })
            .await
            .unwrap();
        assert!(bad.contains("At path 'id'"));
    }

    #[tokio::test]
    async fn test_unparseable_string() {
        let out = tool()
            .call(SchemaCheckArgs {
                data: json!("{oops"),
            })
            .await
            .unwrap();
        assert!(out.contains("At path '(parsing)': Invalid JSON"));
    }
}
