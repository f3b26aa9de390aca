//! Conversation history shared between a chat handle and its streams.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Model turn that follows the instruction prompt in every new conversation.
pub const ACKNOWLEDGMENT: &str = "Okay, I understand my role. I will now respond using GitHub Flavored Markdown to make my answers clear and structured.";

/// Author of a history turn, named the way the Gemini API names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Turn written by the user (or the instruction prompt).
    User,
    /// Turn written by the model.
    Model,
}

/// One turn of conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Author of the turn.
    pub role: Role,
    /// Text of the turn.
    pub text: String,
}

impl Turn {
    /// Create a user turn.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// Create a model turn.
    #[must_use]
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Append-only conversation history.
///
/// Cloning shares the underlying history, so a stream can record its
/// exchange after the handle that created it has returned.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: Arc<Mutex<Vec<Turn>>>,
}

impl ConversationHistory {
    /// History seeded with the instruction prompt and [`ACKNOWLEDGMENT`].
    #[must_use]
    pub fn seeded(instruction_prompt: &str) -> Self {
        Self {
            turns: Arc::new(Mutex::new(vec![
                Turn::user(instruction_prompt),
                Turn::model(ACKNOWLEDGMENT),
            ])),
        }
    }

    /// Copy of all turns.
    pub async fn snapshot(&self) -> Vec<Turn> {
        self.turns.lock().await.clone()
    }

    /// Record a completed exchange.
    pub async fn record_exchange(&self, user_text: String, reply: String) {
        let mut turns = self.turns.lock().await;
        turns.push(Turn::user(user_text));
        turns.push(Turn::model(reply));
    }
}
