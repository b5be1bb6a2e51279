//! One exchange cycle with the model, with tool calls serviced in between.

use thiserror::Error;

use crate::backend::{BackendError, ChatBackend};
use crate::chat::{FinishReason, ToolCall};
use crate::conversation::Conversation;
use crate::tools::ToolRegistry;

/// How an exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The model finished (`stop` or `length`) with this content.
    Final(String),
    /// The model stopped for any other reason; there is no content to use.
    Filtered,
    /// The round cap was reached before the model finished.
    RoundLimit,
}

impl ExchangeOutcome {
    /// Content to decode; empty unless the exchange ended normally.
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::Final(text) => text,
            Self::Filtered | Self::RoundLimit => "",
        }
    }
}

/// Failures that end an exchange. Both abort the current file.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The endpoint failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The response had no choices.
    #[error("Model response contained no choices")]
    EmptyResponse,
}

/// Drives a [`Conversation`] against a [`ChatBackend`].
pub struct ConversationDriver<'a> {
    backend: &'a dyn ChatBackend,
    max_rounds: Option<usize>,
    quota_hints: bool,
}

impl<'a> ConversationDriver<'a> {
    /// Creates a driver. `max_rounds` caps round-trips per conversation,
    /// counted across every exchange on it.
    #[must_use]
    pub const fn new(backend: &'a dyn ChatBackend, max_rounds: Option<usize>, quota_hints: bool) -> Self {
        Self {
            backend,
            max_rounds,
            quota_hints,
        }
    }

    /// Whether `conversation` has used every round the cap allows.
    #[must_use]
    pub fn rounds_exhausted(&self, conversation: &Conversation) -> bool {
        self.max_rounds.is_some_and(|max| conversation.rounds() >= max)
    }

    /// Sends the conversation until the model produces a terminal answer.
    ///
    /// Every assistant and tool message is appended to `conversation`. When
    /// the model asks for several tools at once only the first is executed,
    /// and the logged assistant message is trimmed to that call so the log
    /// never holds an unanswered call id.
    ///
    /// # Errors
    /// Returns [`DriverError`] when the endpoint fails or answers without a
    /// choice.
    pub async fn exchange(
        &self,
        conversation: &mut Conversation,
        registry: &mut ToolRegistry<'_>,
    ) -> Result<ExchangeOutcome, DriverError> {
        loop {
            if self.rounds_exhausted(conversation) {
                tracing::warn!(event = "round_limit_reached", rounds = conversation.rounds());
                return Ok(ExchangeOutcome::RoundLimit);
            }
            conversation.record_round();

            let tools = registry.describe_tools(self.quota_hints).await;
            let response = self.backend.send(conversation.messages(), &tools).await?;
            let choice = response
                .choices
                .into_iter()
                .next()
                .ok_or(DriverError::EmptyResponse)?;

            tracing::debug!(
                event = "model_round",
                round = conversation.rounds(),
                finish_reason = ?choice.finish_reason,
                tools_offered = tools.len(),
            );

            let mut message = choice.message;
            match choice.finish_reason {
                Some(FinishReason::ToolCalls | FinishReason::FunctionCall) => {
                    if message.tool_calls.is_empty() {
                        if let Some(function) = message.function_call.take() {
                            message.tool_calls.push(ToolCall::new(
                                format!("call_{}", conversation.rounds()),
                                function.name,
                                function.arguments,
                            ));
                        }
                    }
                    if message.tool_calls.len() > 1 {
                        tracing::debug!(
                            event = "extra_tool_calls_dropped",
                            dropped = message.tool_calls.len() - 1
                        );
                        message.tool_calls.truncate(1);
                    }

                    let Some(call) = message.tool_calls.first().cloned() else {
                        let text = message.text();
                        conversation.push(message);
                        return Ok(ExchangeOutcome::Final(text));
                    };
                    conversation.push(message);
                    let result = registry.execute(&call).await;
                    conversation.push(result);
                }
                Some(FinishReason::Stop | FinishReason::Length) => {
                    let text = message.text();
                    conversation.push(message);
                    return Ok(ExchangeOutcome::Final(text));
                }
                other => {
                    tracing::warn!(event = "model_output_withheld", finish_reason = ?other);
                    conversation.push(message);
                    return Ok(ExchangeOutcome::Filtered);
                }
            }
        }
    }
}
