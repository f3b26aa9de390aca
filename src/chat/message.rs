//! Chat messages as shown in the transcript.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, unique message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// Typed (or picked from a shortcut) by the visitor.
    User,
    /// Streamed from the generative chat client.
    Bot,
}

/// A single message in the transcript.
///
/// Id, sender and timestamp are fixed at creation. Only the transcript may
/// change the text, and only of bot messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    id: MessageId,
    text: String,
    sender: Sender,
    timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// A user message stamped with the current time.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            text: text.into(),
            sender: Sender::User,
            timestamp: Utc::now(),
        }
    }

    /// An empty bot message to be filled as the reply streams in.
    #[must_use]
    pub fn bot_placeholder() -> Self {
        Self {
            id: MessageId::new(),
            text: String::new(),
            sender: Sender::Bot,
            timestamp: Utc::now(),
        }
    }

    /// Message id.
    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Current text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Author.
    #[must_use]
    pub fn sender(&self) -> Sender {
        self.sender
    }

    /// Creation time.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Creation time as UTC `HH:MM`, shown until the browser localizes it.
    #[must_use]
    pub fn formatted_time(&self) -> String {
        self.timestamp.format("%H:%M").to_string()
    }

    /// Creation time as RFC 3339 with millisecond precision.
    #[must_use]
    pub fn rfc3339_timestamp(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub(crate) fn text_mut(&mut self) -> &mut String {
        &mut self.text
    }
}
