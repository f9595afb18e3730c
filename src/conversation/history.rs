//! Ordered message log mutated by streamed answers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::events::{Sender, SuggestionSource};

/// Opaque message identifier, only ever compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageState {
    /// Bot placeholder still receiving text
    Streaming,
    /// Complete; no further changes
    Settled,
    /// Answer replaced by the apology text; no further changes
    Failed,
}

/// A single message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    pub suggestions: Vec<String>,
    /// Channel that wrote `suggestions` last
    pub suggestion_source: Option<SuggestionSource>,
    pub state: MessageState,
}

impl Message {
    fn new(sender: Sender, text: String, state: MessageState) -> Self {
        Self {
            id: MessageId::new(),
            text,
            sender,
            timestamp: Utc::now(),
            suggestions: Vec::new(),
            suggestion_source: None,
            state,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text.into(), MessageState::Settled)
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(Sender::Bot, text.into(), MessageState::Settled)
    }

    /// Empty bot message that a streamed answer fills in
    pub fn placeholder() -> Self {
        Self::new(Sender::Bot, String::new(), MessageState::Streaming)
    }

    pub fn is_streaming(&self) -> bool {
        self.state == MessageState::Streaming
    }
}

/// Append-only conversation log.
///
/// Every mutation is keyed by [`MessageId`] and unknown ids are ignored.
/// Text and state only change while a message is `Streaming`. Suggestions
/// may still land on a settled bot message, since the side channel can
/// resolve after the text.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    messages: Vec<Message>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message at the end and return its id
    pub fn append(&mut self, message: Message) -> MessageId {
        let id = message.id;
        self.messages.push(message);
        id
    }

    pub fn append_to_text(&mut self, id: MessageId, fragment: &str) -> bool {
        match self.streaming_mut(id) {
            Some(message) => {
                message.text.push_str(fragment);
                true
            }
            None => false,
        }
    }

    /// Last write wins, whichever channel it came from
    pub fn set_suggestions(
        &mut self,
        id: MessageId,
        suggestions: Vec<String>,
        source: SuggestionSource,
    ) -> bool {
        match self.answer_mut(id) {
            Some(message) => {
                if let Some(previous) = message.suggestion_source {
                    tracing::debug!(message_id = %id, %previous, %source, "Suggestions overwritten");
                }
                message.suggestions = suggestions;
                message.suggestion_source = Some(source);
                true
            }
            None => false,
        }
    }

    /// Replace the text with `apology` and freeze the message
    pub fn fail(&mut self, id: MessageId, apology: &str) -> bool {
        match self.streaming_mut(id) {
            Some(message) => {
                message.text = apology.to_string();
                message.state = MessageState::Failed;
                true
            }
            None => false,
        }
    }

    /// Freeze the message as it stands
    pub fn settle(&mut self, id: MessageId) -> bool {
        match self.streaming_mut(id) {
            Some(message) => {
                message.state = MessageState::Settled;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
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

    /// Bot message that has not failed
    fn answer_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        let message = self.messages.iter_mut().find(|m| m.id == id)?;
        match (message.sender, message.state) {
            (Sender::Bot, MessageState::Streaming | MessageState::Settled) => Some(message),
            _ => {
                tracing::debug!(message_id = %id, state = ?message.state, "Ignoring suggestions");
                None
            }
        }
    }

    fn streaming_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        let message = self.messages.iter_mut().find(|m| m.id == id)?;
        if message.is_streaming() {
            Some(message)
        } else {
            tracing::debug!(message_id = %id, state = ?message.state, "Ignoring update to settled message");
            None
        }
    }
}
