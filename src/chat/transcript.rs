//! Ordered transcript with an id index for in-place updates.

use std::collections::HashMap;

use super::message::{ChatMessage, MessageId, Sender};

/// Errors from transcript mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptError {
    /// A message with this id is already in the transcript.
    #[error("message {0} is already in the transcript")]
    DuplicateId(MessageId),
    /// No message with this id.
    #[error("message {0} not found")]
    UnknownId(MessageId),
    /// User messages are fixed at creation.
    #[error("message {0} was sent by the user and cannot be edited")]
    NotEditable(MessageId),
}

/// Insertion-ordered list of messages.
///
/// Messages are never removed or reordered. The index maps each id to its
/// position so streamed fragments can be applied without a scan.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    index: HashMap<MessageId, usize>,
}

impl Transcript {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    pub fn push(&mut self, message: ChatMessage) -> Result<MessageId, TranscriptError> {
        let id = message.id();
        if self.index.contains_key(&id) {
            return Err(TranscriptError::DuplicateId(id));
        }
        self.index.insert(id, self.messages.len());
        self.messages.push(message);
        Ok(id)
    }

    /// Append a fragment to a bot message's text.
    pub fn append_text(
        &mut self,
        id: MessageId,
        fragment: &str,
    ) -> Result<&ChatMessage, TranscriptError> {
        let message = self.bot_message_mut(id)?;
        message.text_mut().push_str(fragment);
        Ok(message)
    }

    /// Replace a bot message's text.
    pub fn set_text(&mut self, id: MessageId, text: String) -> Result<&ChatMessage, TranscriptError> {
        let message = self.bot_message_mut(id)?;
        *message.text_mut() = text;
        Ok(message)
    }

    /// Look up a message by id.
    #[must_use]
    pub fn get(&self, id: MessageId) -> Option<&ChatMessage> {
        self.index.get(&id).map(|&pos| &self.messages[pos])
    }

    /// All messages in insertion order.
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Most recently appended message.
    #[must_use]
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript has no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn bot_message_mut(&mut self, id: MessageId) -> Result<&mut ChatMessage, TranscriptError> {
        let pos = *self.index.get(&id).ok_or(TranscriptError::UnknownId(id))?;
        let message = &mut self.messages[pos];
        if message.sender() != Sender::Bot {
            return Err(TranscriptError::NotEditable(id));
        }
        Ok(message)
    }
}
