//! Transcript change events pushed to the chat view.
//!
//! A [`ChatSession`](crate::chat::ChatSession) publishes a [`ChatEvent`] for
//! every mutation. The SSE endpoint forwards them to the browser, which
//! replaces message bubbles by id.
//!
//! # Event Types
//!
//! - `snapshot`: full transcript, sent first on every subscription
//! - `message.appended`: a new message at the end of the transcript
//! - `message.updated`: new text for an existing message
//! - `typing`: the typing flag changed
//!
//! # Example
//!
//! ```rust
//! use prebot::events::ChatEvent;
//!
//! let event = ChatEvent::Typing { is_typing: true };
//! assert_eq!(event.name(), "typing");
//! assert_eq!(event.to_json(), r#"{"type":"typing","data":{"is_typing":true}}"#);
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::chat::{ChatMessage, MessageId, Sender};
use crate::ui::chat::render_message;

/// A message as the view consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageView {
    /// Message id, used as the DOM key.
    pub id: MessageId,
    /// Author.
    pub sender: Sender,
    /// Raw text.
    pub text: String,
    /// Creation time as UTC `HH:MM`.
    pub time: String,
    /// Creation time, for formatting in the viewer's timezone.
    pub timestamp: DateTime<Utc>,
    /// Rendered message bubble.
    pub html: String,
}

impl From<&ChatMessage> for MessageView {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: message.id(),
            sender: message.sender(),
            text: message.text().to_string(),
            time: message.formatted_time(),
            timestamp: message.timestamp(),
            html: render_message(message),
        }
    }
}

/// Events published by a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatEvent {
    /// Complete state, sent when a view subscribes or falls behind.
    #[serde(rename = "snapshot")]
    Snapshot {
        /// All messages in order.
        messages: Vec<MessageView>,
        /// Typing flag.
        is_typing: bool,
        /// Unsent input text.
        draft: String,
    },

    /// A message was appended.
    #[serde(rename = "message.appended")]
    MessageAppended(MessageView),

    /// A message's text changed.
    #[serde(rename = "message.updated")]
    MessageUpdated(MessageView),

    /// The typing flag changed.
    #[serde(rename = "typing")]
    Typing {
        /// New value.
        is_typing: bool,
    },
}

impl ChatEvent {
    /// SSE event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Snapshot { .. } => "snapshot",
            Self::MessageAppended(_) => "message.appended",
            Self::MessageUpdated(_) => "message.updated",
            Self::Typing { .. } => "typing",
        }
    }

    /// JSON payload.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "type": "error", "data": { "message": e.to_string() } }).to_string()
        })
    }
}
