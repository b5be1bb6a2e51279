//! The append-only message log of one segment attempt.

use serde_json::Value;

use crate::chat::Message;

/// Messages exchanged while processing one segment, plus the number of model
/// round-trips spent so far.
///
/// Messages are only ever appended. The log doubles as the transcript that
/// can be persisted for audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
    rounds: usize,
}

impl Conversation {
    /// Starts a conversation with its system and user prompts.
    #[must_use]
    pub fn new(system: Message, user: Message) -> Self {
        Self {
            messages: vec![system, user],
            rounds: 0,
        }
    }

    /// Appends a message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// All messages in order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Most recent message.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Model round-trips made so far.
    #[must_use]
    pub const fn rounds(&self) -> usize {
        self.rounds
    }

    /// Counts one round-trip.
    pub const fn record_round(&mut self) {
        self.rounds += 1;
    }

    /// The messages as a JSON array.
    #[must_use]
    pub fn to_transcript(&self) -> Value {
        serde_json::to_value(&self.messages).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Role;

    #[test]
    fn test_transcript_keeps_order() {
        let mut conversation = Conversation::new(Message::system("s"), Message::user("u"));
        conversation.push(Message::assistant("a"));
        conversation.record_round();

        let transcript = conversation.to_transcript();
        let roles: Vec<&str> = transcript
            .as_array()
            .map(|a| a.iter().filter_map(|m| m["role"].as_str()).collect())
            .unwrap_or_default();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert_eq!(conversation.rounds(), 1);
        assert_eq!(conversation.last().map(|m| m.role), Some(Role::Assistant));
    }
}
