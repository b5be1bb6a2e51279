//! Built-in tools, their per-file quotas, and the registry that advertises
//! and executes them.
//!
//! The tool set is closed: every tool is a variant of [`BuiltinTool`] and
//! implements Rig's [`Tool`] trait for its definition and call. A
//! [`ToolBox`] maps names to tools once at startup; a [`ToolRegistry`] pairs
//! the toolbox with a fresh [`ToolState`] for each file.

pub mod python;
pub mod schema_check;
pub mod think;
pub mod web_fetch;

use rig::completion::ToolDefinition;
use rig::tool::Tool;
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::chat::{Message, ToolCall, ToolDescriptor};

pub use python::RunPythonTool;
pub use schema_check::SchemaCheckTool;
pub use think::ThinkTool;
pub use web_fetch::WebFetchTool;

/// Names the model calls the built-in tools by.
pub mod names {
    /// [`RunPythonTool`](super::RunPythonTool)
    pub const RUN_PYTHON: &str = "run_python";
    /// [`WebFetchTool`](super::WebFetchTool)
    pub const WEB_FETCH: &str = "web_fetch";
    /// [`ThinkTool`](super::ThinkTool)
    pub const THINK: &str = "think";
    /// [`SchemaCheckTool`](super::SchemaCheckTool)
    pub const SCHEMA_CHECK: &str = "schema_validation";
}

/// Description shown for a tool whose quota is spent.
pub const UNAVAILABLE_NOTICE: &str = "Currently you don't have access to this tool.";

/// Error type for built-in tools. Rendered to the model as `Error: ...`.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ToolError {
    /// The tool ran and failed.
    #[error("{0}")]
    Execution(String),
    /// The arguments were unacceptable.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

/// JSON Schema for a tool's argument type, without the draft and title keys.
pub(crate) fn parameters_for<T: JsonSchema>() -> Value {
    let mut schema = json!(schema_for!(T));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    schema
}

/// The closed set of tools the model can call.
pub enum BuiltinTool {
    /// Sandboxed Python.
    RunPython(RunPythonTool),
    /// HTTP GET/POST.
    WebFetch(WebFetchTool),
    /// Scratchpad reasoning.
    Think(ThinkTool),
    /// Schema check of a draft object.
    SchemaCheck(SchemaCheckTool),
}

impl BuiltinTool {
    /// Name the model calls the tool by.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RunPython(_) => RunPythonTool::NAME,
            Self::WebFetch(_) => WebFetchTool::NAME,
            Self::Think(_) => ThinkTool::NAME,
            Self::SchemaCheck(_) => SchemaCheckTool::NAME,
        }
    }

    /// Definition advertised to the model.
    pub async fn definition(&self) -> ToolDefinition {
        match self {
            Self::RunPython(t) => t.definition(String::new()).await,
            Self::WebFetch(t) => t.definition(String::new()).await,
            Self::Think(t) => t.definition(String::new()).await,
            Self::SchemaCheck(t) => t.definition(String::new()).await,
        }
    }

    /// Runs the tool on JSON-encoded `arguments`. Every failure, including
    /// undecodable arguments, comes back as an `Error: ...` string.
    pub async fn invoke(&self, arguments: &str) -> String {
        match self {
            Self::RunPython(t) => call_with_json(t, arguments).await,
            Self::WebFetch(t) => call_with_json(t, arguments).await,
            Self::Think(t) => call_with_json(t, arguments).await,
            Self::SchemaCheck(t) => call_with_json(t, arguments).await,
        }
    }
}

async fn call_with_json<T>(tool: &T, arguments: &str) -> String
where
    T: Tool<Output = String, Error = ToolError>,
{
    let arguments = if arguments.trim().is_empty() { "{}" } else { arguments };
    let args: T::Args = match serde_json::from_str(arguments) {
        Ok(args) => args,
        Err(e) => return format!("Error: {}", ToolError::InvalidArguments(e.to_string())),
    };
    match tool.call(args).await {
        Ok(output) => output,
        Err(e) => format!("Error: {e}"),
    }
}

/// Name-to-tool mapping built once per run.
#[derive(Default)]
pub struct ToolBox {
    tools: Vec<BuiltinTool>,
}

impl ToolBox {
    /// Empty toolbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool, replacing any tool with the same name.
    #[must_use]
    pub fn with(mut self, tool: BuiltinTool) -> Self {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
        self
    }

    /// Looks a tool up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BuiltinTool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Tools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &BuiltinTool> {
        self.tools.iter()
    }

    /// Number of tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Configured per-file call limits, by tool name. Missing names mean zero.
///
/// Deserializing starts from [`ToolLimits::default`], so a table that names
/// only some tools keeps the defaults of the rest. An explicit `0` turns a
/// tool off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ToolLimits(BTreeMap<String, u32>);

impl<'de> Deserialize<'de> for ToolLimits {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let overrides = BTreeMap::<String, u32>::deserialize(deserializer)?;
        let mut limits = Self::default();
        limits.0.extend(overrides);
        Ok(limits)
    }
}

impl Default for ToolLimits {
    fn default() -> Self {
        Self(BTreeMap::from([
            (names::RUN_PYTHON.to_string(), 5),
            (names::WEB_FETCH.to_string(), 5),
            (names::THINK.to_string(), 5),
            (names::SCHEMA_CHECK.to_string(), 3),
        ]))
    }
}

impl ToolLimits {
    /// No tool allowed.
    #[must_use]
    pub fn none() -> Self {
        Self(BTreeMap::new())
    }

    /// Sets the limit for `name`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, limit: u32) -> Self {
        self.0.insert(name.into(), limit);
        self
    }

    /// Limit for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> u32 {
        self.0.get(name).copied().unwrap_or(0)
    }

    /// Iterates `(name, limit)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Remaining and initial uses of one tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolQuota {
    /// Uses granted at the start of the file.
    pub initial: u32,
    /// Uses left; never above `initial`.
    pub remaining: u32,
}

/// Why a call could not be charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaError {
    /// No quota entry for the tool.
    Unknown,
    /// Remaining uses are zero.
    Exhausted,
}

/// Per-file quota counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolState {
    quotas: BTreeMap<String, ToolQuota>,
}

impl ToolState {
    /// Fresh counters at their initial values.
    #[must_use]
    pub fn new(limits: &ToolLimits) -> Self {
        let mut state = Self::default();
        state.reset(limits);
        state
    }

    /// Reinitializes every counter to its configured limit.
    pub fn reset(&mut self, limits: &ToolLimits) {
        self.quotas = limits
            .iter()
            .map(|(name, limit)| {
                (
                    name.to_string(),
                    ToolQuota {
                        initial: limit,
                        remaining: limit,
                    },
                )
            })
            .collect();
    }

    /// True iff some tool still has uses left.
    #[must_use]
    pub fn has_callable_tools(&self) -> bool {
        self.quotas.values().any(|q| q.remaining > 0)
    }

    /// Quota for `name`.
    #[must_use]
    pub fn quota(&self, name: &str) -> Option<ToolQuota> {
        self.quotas.get(name).copied()
    }

    /// Takes one use of `name`, returning the uses left afterwards.
    ///
    /// # Errors
    /// Returns [`QuotaError`] without changing any counter when the tool is
    /// unknown or exhausted.
    pub fn consume(&mut self, name: &str) -> Result<u32, QuotaError> {
        let quota = self.quotas.get_mut(name).ok_or(QuotaError::Unknown)?;
        if quota.remaining == 0 {
            return Err(QuotaError::Exhausted);
        }
        quota.remaining -= 1;
        Ok(quota.remaining)
    }
}

/// The toolbox plus one file's quota counters.
pub struct ToolRegistry<'a> {
    toolbox: &'a ToolBox,
    state: ToolState,
    calls: usize,
}

impl<'a> ToolRegistry<'a> {
    /// Registry with counters at their initial values.
    #[must_use]
    pub fn new(toolbox: &'a ToolBox, limits: &ToolLimits) -> Self {
        Self {
            toolbox,
            state: ToolState::new(limits),
            calls: 0,
        }
    }

    /// Reinitializes the counters; called once per file.
    pub fn reset(&mut self, limits: &ToolLimits) {
        self.state.reset(limits);
        self.calls = 0;
    }

    /// True iff some registered tool still has uses left.
    #[must_use]
    pub fn has_callable_tools(&self) -> bool {
        self.toolbox
            .iter()
            .any(|t| self.state.quota(t.name()).is_some_and(|q| q.remaining > 0))
    }

    /// Current counters.
    #[must_use]
    pub const fn state(&self) -> &ToolState {
        &self.state
    }

    /// Tool calls serviced since the last reset.
    #[must_use]
    pub const fn calls(&self) -> usize {
        self.calls
    }

    /// Descriptors for the next request.
    ///
    /// Tools with no initial quota are omitted. Tools whose quota is spent
    /// stay listed with [`UNAVAILABLE_NOTICE`] as their description.
    pub async fn describe_tools(&self, include_quota_hint: bool) -> Vec<ToolDescriptor> {
        let mut descriptors = Vec::new();
        for tool in self.toolbox.iter() {
            let Some(quota) = self.state.quota(tool.name()).filter(|q| q.initial > 0) else {
                continue;
            };
            let mut definition = tool.definition().await;
            if quota.remaining == 0 {
                definition.description = UNAVAILABLE_NOTICE.to_string();
            } else if include_quota_hint {
                definition.description.push_str(&format!(
                    "\n\nYou have {} calls to this tool left.",
                    quota.remaining
                ));
            }
            descriptors.push(ToolDescriptor::from(definition));
        }
        descriptors
    }

    /// Services one tool call and returns the tool result message.
    ///
    /// The quota is charged before the tool runs, so a call that fails
    /// inside the tool still counts.
    pub async fn execute(&mut self, call: &ToolCall) -> Message {
        let name = call.function.name.as_str();
        let Some(tool) = self.toolbox.get(name) else {
            tracing::warn!(event = "tool_not_found", tool = name);
            return Message::tool(&call.id, format!("Error: {name} not found."));
        };

        let remaining = match self.state.consume(name) {
            Ok(remaining) => remaining,
            Err(QuotaError::Exhausted | QuotaError::Unknown) => {
                tracing::warn!(event = "tool_quota_exhausted", tool = name);
                return Message::tool(
                    &call.id,
                    format!("Error: call limit for {name} exceeded. Continue without this tool."),
                );
            }
        };

        self.calls += 1;
        tracing::info!(event = "tool_invoked", tool = name, remaining);
        let output = tool.invoke(&call.function.arguments).await;
        tracing::debug!(event = "tool_output", tool = name, bytes = output.len());
        Message::tool(&call.id, output)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::chat::Content;

    fn toolbox() -> ToolBox {
        ToolBox::new()
            .with(BuiltinTool::Think(ThinkTool))
            .with(BuiltinTool::WebFetch(WebFetchTool::new()))
    }

    fn limits() -> ToolLimits {
        ToolLimits::none().with("think", 2).with("web_fetch", 0)
    }

    fn content(message: &Message) -> &str {
        match &message.content {
            Some(Content::Text(t)) => t,
            _ => "",
        }
    }

    #[test]
    fn test_reset_restores_initial_values() {
        let mut state = ToolState::new(&limits());
        state.consume("think").unwrap();
        assert_eq!(state.quota("think").unwrap().remaining, 1);

        state.reset(&limits());
        for name in ["think", "web_fetch"] {
            let q = state.quota(name).unwrap();
            assert_eq!(q.remaining, q.initial);
        }
    }

    #[test]
    fn test_has_callable_tools_iff_some_remaining() {
        let mut state = ToolState::new(&limits());
        assert!(state.has_callable_tools());
        state.consume("think").unwrap();
        assert!(state.has_callable_tools());
        state.consume("think").unwrap();
        assert!(!state.has_callable_tools());
        assert_eq!(state.consume("think"), Err(QuotaError::Exhausted));
        assert_eq!(state.quota("think").unwrap().remaining, 0);
        assert_eq!(state.consume("nope"), Err(QuotaError::Unknown));
    }

    #[tokio::test]
    async fn test_zero_initial_quota_is_never_described() {
        let tb = toolbox();
        let registry = ToolRegistry::new(&tb, &limits());
        let names: Vec<String> = registry
            .describe_tools(false)
            .await
            .into_iter()
            .map(|d| d.function.name)
            .collect();
        assert_eq!(names, vec!["think"]);
    }

    #[tokio::test]
    async fn test_quota_hint_and_exhaustion_notice() {
        let tb = toolbox();
        let mut registry = ToolRegistry::new(&tb, &limits());

        let described = registry.describe_tools(true).await;
        assert!(described[0].function.description.ends_with("You have 2 calls to this tool left."));

        let call = ToolCall::new("c1", "think", r#"{"conclusion": "x"}"#);
        registry.execute(&call).await;
        registry.execute(&call).await;

        let described = registry.describe_tools(true).await;
        assert_eq!(described.len(), 1);
        assert_eq!(described[0].function.description, UNAVAILABLE_NOTICE);
        assert!(!registry.has_callable_tools());
    }

    #[tokio::test]
    async fn test_execute_decrements_and_wraps_output() {
        let tb = toolbox();
        let mut registry = ToolRegistry::new(&tb, &limits());

        let reply = registry
            .execute(&ToolCall::new("c7", "think", r#"{"thoughts": "t", "conclusion": "42"}"#))
            .await;
        assert_eq!(reply.tool_call_id.as_deref(), Some("c7"));
        assert_eq!(content(&reply), "42");
        assert_eq!(registry.state().quota("think").unwrap().remaining, 1);
        assert_eq!(registry.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_message() {
        let tb = toolbox();
        let mut registry = ToolRegistry::new(&tb, &limits());
        let reply = registry.execute(&ToolCall::new("c1", "rm_rf", "{}")).await;
        assert_eq!(content(&reply), "Error: rm_rf not found.");
    }

    #[tokio::test]
    async fn test_exhausted_tool_is_not_charged_further() {
        let tb = toolbox();
        let mut registry = ToolRegistry::new(&tb, &limits());
        let reply = registry
            .execute(&ToolCall::new("c1", "web_fetch", r#"{"url": "https://example.com"}"#))
            .await;
        assert!(content(&reply).starts_with("Error: call limit for web_fetch exceeded"));
        assert_eq!(registry.state().quota("web_fetch").unwrap().remaining, 0);
        assert_eq!(registry.calls(), 0);
    }

    #[tokio::test]
    async fn test_bad_arguments_still_count() {
        let tb = toolbox();
        let mut registry = ToolRegistry::new(&tb, &limits());
        let reply = registry.execute(&ToolCall::new("c1", "think", "not json")).await;
        assert!(content(&reply).starts_with("Error: invalid arguments"));
        assert_eq!(registry.state().quota("think").unwrap().remaining, 1);
    }

    #[test]
    fn test_default_limits() {
        let limits = ToolLimits::default();
        assert_eq!(limits.get("run_python"), 5);
        assert_eq!(limits.get("schema_validation"), 3);
        assert_eq!(limits.get("unknown"), 0);
    }
}
