//! The visible transcript of one chat session.
//!
//! Append-only within a session: messages are added after a validated user
//! turn and after a produced reply, never edited in place. The transcript
//! is emptied only by an explicit new-chat action.

use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One transcript entry. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Set when the message arrived through the voice loop.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub voice: bool,
}

pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Replace the transcript wholesale, used when loading persisted or
    /// archived history.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn add_user_message(&mut self, content: &str, voice: bool) {
        self.messages.push(Message {
            role: Role::User,
            content: content.to_string(),
            voice,
        });
    }

    pub fn add_assistant_message(&mut self, content: &str) {
        self.messages.push(Message {
            role: Role::Assistant,
            content: content.to_string(),
            voice: false,
        });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
