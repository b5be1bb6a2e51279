//! The LLM endpoint seam.
//!
//! [`ChatBackend`] is the only way the driver talks to a model. The HTTP
//! implementation lives in [`crate::openai`]; [`ScriptedBackend`] replays
//! canned responses for tests and dry runs.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::chat::{ChatResponse, FinishReason, Message, ToolCall, ToolDescriptor};

/// Transport and endpoint failures. Each one aborts the current file.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Backend could not be constructed from its settings.
    #[error("Backend configuration error: {0}")]
    Config(String),

    /// The request never produced a response.
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response.
    #[error("Endpoint returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// 2xx response carrying an `{"error": ...}` payload.
    #[error("Endpoint reported an error: {0}")]
    Api(String),

    /// Response body is not a chat completion.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// A scripted backend ran out of responses.
    #[error("No scripted response left for request #{0}")]
    ScriptExhausted(usize),
}

/// A blocking-from-the-caller's-view chat completion endpoint.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Sends the conversation so far plus the advertised tools.
    ///
    /// An empty `tools` slice means no tool fields are sent.
    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ChatResponse, BackendError>;
}

/// What a [`ScriptedBackend`] saw on one call.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Messages sent.
    pub messages: Vec<Message>,
    /// Tools advertised.
    pub tools: Vec<ToolDescriptor>,
}

/// Replays queued responses in order and records every request.
///
/// Clones share the same queue and log, so a test can keep a handle while
/// the orchestrator owns another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    responses: Arc<Mutex<VecDeque<Result<ChatResponse, String>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ScriptedBackend {
    /// Creates an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an arbitrary response.
    #[must_use]
    pub fn respond(self, response: ChatResponse) -> Self {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Ok(response));
        }
        self
    }

    /// Queues a final answer with `finish_reason = "stop"`.
    #[must_use]
    pub fn reply(self, content: impl Into<String>) -> Self {
        self.respond(ChatResponse::single(
            Message::assistant(content),
            Some(FinishReason::Stop),
        ))
    }

    /// Queues a single tool call with `finish_reason = "tool_calls"`.
    #[must_use]
    pub fn call_tool(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        self.respond(ChatResponse::single(
            Message::assistant_tool_calls(vec![ToolCall::new(id, name, arguments)]),
            Some(FinishReason::ToolCalls),
        ))
    }

    /// Queues a transport failure.
    #[must_use]
    pub fn fail(self, message: impl Into<String>) -> Self {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Err(message.into()));
        }
        self
    }

    /// Every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Number of responses not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|q| q.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ChatResponse, BackendError> {
        let index = {
            let mut requests = self
                .requests
                .lock()
                .map_err(|e| BackendError::Config(e.to_string()))?;
            requests.push(RecordedRequest {
                messages: messages.to_vec(),
                tools: tools.to_vec(),
            });
            requests.len()
        };

        let next = self
            .responses
            .lock()
            .map_err(|e| BackendError::Config(e.to_string()))?
            .pop_front();

        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(BackendError::Network(message)),
            None => Err(BackendError::ScriptExhausted(index)),
        }
    }
}
