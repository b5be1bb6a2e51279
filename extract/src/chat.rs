//! Chat-completion wire types shared by the driver, the tool registry and
//! every [`ChatBackend`](crate::backend::ChatBackend).
//!
//! The shapes follow the OpenAI chat-completions format, which is what the
//! configured endpoints speak.

use rig::completion::ToolDefinition;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Reads a list that some providers send as `null` when it is empty.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions for the model.
    System,
    /// Prompt, document content and correction requests.
    User,
    /// Model output.
    Assistant,
    /// Result of a tool call.
    Tool,
}

/// Image reference inside a content part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// `data:` URI or remote URL.
    pub url: String,
}

/// One part of a multi-part user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// An attached image.
    ImageUrl {
        /// The image location.
        image_url: ImageUrl,
    },
}

/// Message content: a plain string or a list of parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Plain string content.
    Text(String),
    /// Multi-part content (text plus images).
    Parts(Vec<ContentPart>),
}

/// Function name and JSON-encoded arguments of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Tool name chosen by the model.
    pub name: String,
    /// JSON-encoded argument object.
    #[serde(default)]
    pub arguments: String,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier echoed back in the tool result message.
    pub id: String,
    /// Always `"function"`.
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    /// The call itself.
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    /// Creates a function tool call.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author.
    pub role: Role,
    /// Body; assistant messages that only call tools carry none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    /// Tool calls requested by an assistant message.
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tool_calls: Vec<ToolCall>,
    /// Legacy single function call; normalized into `tool_calls` by the driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    /// Id of the call a tool message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(Content::Text(text.into())),
            tool_calls: Vec::new(),
            function_call: None,
            tool_call_id: None,
        }
    }

    /// System message.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_text(Role::System, text)
    }

    /// Plain-text user message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_text(Role::User, text)
    }

    /// User message made of several parts. A single text part collapses to
    /// plain string content.
    #[must_use]
    pub fn user_parts(mut parts: Vec<ContentPart>) -> Self {
        if let [ContentPart::Text { text }] = parts.as_mut_slice() {
            return Self::user(std::mem::take(text));
        }
        Self {
            role: Role::User,
            content: Some(Content::Parts(parts)),
            tool_calls: Vec::new(),
            function_call: None,
            tool_call_id: None,
        }
    }

    /// Assistant message with text content.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_text(Role::Assistant, text)
    }

    /// Assistant message that requests tool calls.
    #[must_use]
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls,
            function_call: None,
            tool_call_id: None,
        }
    }

    /// Tool result message answering `tool_call_id`.
    #[must_use]
    pub fn tool(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_text(Role::Tool, text)
        }
    }

    /// Text of the message. Parts are joined with newlines; images are skipped.
    #[must_use]
    pub fn text(&self) -> String {
        match &self.content {
            None => String::new(),
            Some(Content::Text(text)) => text.clone(),
            Some(Content::Parts(parts)) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of the answer.
    Stop,
    /// Token limit reached.
    Length,
    /// The model wants tools executed.
    ToolCalls,
    /// Legacy single function call.
    FunctionCall,
    /// Output withheld by the provider's filter.
    ContentFilter,
    /// Anything this client does not know.
    #[serde(other)]
    Unknown,
}

/// One completion choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// The generated message.
    pub message: Message,
    /// Stop reason; `None` when the provider sent `null`.
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// Chat-completion response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Completion choices; only the first one is used.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub choices: Vec<Choice>,
}

impl ChatResponse {
    /// Response with a single choice.
    #[must_use]
    pub fn single(message: Message, finish_reason: Option<FinishReason>) -> Self {
        Self {
            choices: vec![Choice {
                message,
                finish_reason,
            }],
        }
    }
}

/// The `function` member of a tool descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Tool name.
    pub name: String,
    /// What the tool does, plus any quota notice.
    pub description: String,
    /// JSON Schema of the argument object.
    pub parameters: Value,
}

/// Tool advertisement sent with a request:
/// `{"type": "function", "function": {name, description, parameters}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Always `"function"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The advertised function.
    pub function: FunctionDescriptor,
}

impl From<ToolDefinition> for ToolDescriptor {
    fn from(def: ToolDefinition) -> Self {
        Self {
            kind: function_kind(),
            function: FunctionDescriptor {
                name: def.name,
                description: def.description,
                parameters: def.parameters,
            },
        }
    }
}
