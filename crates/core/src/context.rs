//! Conversation context: the ordered, append-only history one agent sees.
//!
//! Appends made while a turn is running are staged in a [`TurnBuffer`] and
//! only land in the context when the turn commits. A cancelled or failed
//! turn drops its buffer, so the shared history never holds half a turn.

use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};

/// Ordered history plus the system messages prefixed to every model call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    system_messages: Vec<Message>,
    messages: Vec<Message>,
    /// Keep only the last N messages in the model view
    #[serde(default, skip_serializing_if = "Option::is_none")]
    buffer_size: Option<usize>,
}

impl ConversationContext {
    pub fn new(system_messages: Vec<Message>) -> Self {
        Self {
            system_messages,
            messages: Vec::new(),
            buffer_size: None,
        }
    }

    /// Limit the model view to the most recent `size` messages.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    /// Append one message. Appends are the only mutation.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Move every staged message of a finished turn into the history.
    pub fn commit(&mut self, turn: TurnBuffer) {
        self.messages.extend(turn.staged);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn system_messages(&self) -> &[Message] {
        &self.system_messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages to send to the model: system messages, then the windowed
    /// history including anything staged by the running turn.
    pub fn model_view(&self, turn: &TurnBuffer) -> Vec<Message> {
        let history: Vec<&Message> = self.messages.iter().chain(turn.staged.iter()).collect();

        let mut start = match self.buffer_size {
            Some(size) if history.len() > size => history.len() - size,
            _ => 0,
        };
        // A tool result must not reach the model without its call.
        while start < history.len() && history[start].role == Role::Tool {
            start += 1;
        }

        self.system_messages
            .iter()
            .cloned()
            .chain(history[start..].iter().map(|m| (*m).clone()))
            .collect()
    }
}

/// Messages produced by a running turn, not yet visible to other turns.
#[derive(Debug, Default)]
pub struct TurnBuffer {
    staged: Vec<Message>,
}

impl TurnBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&mut self, message: Message) {
        self.staged.push(message);
    }

    pub fn staged(&self) -> &[Message] {
        &self.staged
    }
}
