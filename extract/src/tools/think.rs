use rig::completion::ToolDefinition;
use rig::tool::Tool;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ToolError, names, parameters_for};

/// Arguments for [`ThinkTool`].
#[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct ThinkArgs {
    /// Step-by-step reasoning.
    #[serde(default)]
    pub thoughts: String,
    /// The result of the reasoning.
    #[serde(default)]
    pub conclusion: String,
}

/// Scratchpad: the model writes its reasoning and gets its conclusion back.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThinkTool;

impl Tool for ThinkTool {
    const NAME: &'static str = names::THINK;
    type Error = ToolError;
    type Args = ThinkArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Think step by step before answering. Put your reasoning in `thoughts` \
                          and the outcome in `conclusion`; only the conclusion is returned."
                .to_string(),
            parameters: parameters_for::<ThinkArgs>(),
        }
    }

    async fn call(&self, args: ThinkArgs) -> Result<String, ToolError> {
        tracing::debug!(event = "think", thought_chars = args.thoughts.chars().count());
        Ok(args.conclusion)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_conclusion_only() {
        let out = ThinkTool
            .call(ThinkArgs {
                thoughts: "long reasoning".to_string(),
                conclusion: "total is 12".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(out, "total is 12");
    }

    #[tokio::test]
    async fn test_definition_parameters() {
        let def = ThinkTool.definition(String::new()).await;
        assert_eq!(def.name, "think");
        assert!(def.parameters["properties"].get("conclusion").is_some());
        assert!(def.parameters.get("$schema").is_none());
    }
}
