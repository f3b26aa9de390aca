//! Generative chat client abstractions.
//!
//! The chat store never talks to a model API directly. It asks a
//! [`GenerativeChatClient`] for a [`ChatHandle`] seeded with an instruction
//! prompt, then calls [`ChatHandle::send_streamed`] once per user turn and
//! consumes the returned [`FragmentStream`].
//!
//! # Clients
//!
//! - [`GeminiClient`]: Google Generative Language API (`streamGenerateContent`)
//! - [`ScriptedChatClient`]: in-process replies for tests and offline demos
//!
//! # Example
//!
//! ```rust,ignore
//! use prebot::llm::{GenerativeChatClient, ScriptedChatClient, ScriptedReply};
//!
//! let client = ScriptedChatClient::new();
//! client.push_reply(ScriptedReply::fragments(["Hel", "lo"]));
//!
//! let handle = client.start_session("You are PreBot.");
//! let stream = handle.send_streamed("Hi").await?;
//! ```

pub mod gemini;
mod history;
pub mod scripted;

pub use gemini::{GeminiClient, GeminiSettings};
pub use history::{ACKNOWLEDGMENT, ConversationHistory, Role, Turn};
pub use scripted::{ScriptedChatClient, ScriptedReply};

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;

/// Lazy, finite, non-restartable sequence of reply fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Errors raised while starting or consuming a streamed reply.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// No credential was configured for the API.
    #[error("no API key configured for the generative language API")]
    MissingApiKey,

    /// The configured endpoint could not be turned into a request URL.
    #[error("invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("API returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as sent by the API.
        body: String,
    },

    /// The API reported an error inside the stream.
    #[error("API error: {0}")]
    Api(String),

    /// The prompt or the reply was blocked by the provider.
    #[error("response blocked: {0}")]
    Blocked(String),

    /// A streamed frame could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A successful response carried no SSE data frames at all.
    #[error("response contained no stream data: {0}")]
    NoData(String),

    /// No fragment arrived within the idle timeout.
    #[error("no reply fragment received within {0:?}")]
    Timeout(Duration),

    /// Failure injected by a scripted reply.
    #[error("{0}")]
    Scripted(String),
}

/// A conversation bound to one instruction prompt.
///
/// The handle owns the conversation history. History grows only when a
/// streamed reply completes without error.
#[async_trait::async_trait]
pub trait ChatHandle: Send + Sync + std::fmt::Debug {
    /// Send a user turn and stream the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started. Errors after the
    /// stream starts are yielded as stream items.
    async fn send_streamed(&self, text: &str) -> Result<FragmentStream, LlmError>;

    /// Snapshot of the conversation history, seed turns included.
    async fn history(&self) -> Vec<Turn>;
}

/// Factory for [`ChatHandle`]s.
pub trait GenerativeChatClient: Send + Sync + std::fmt::Debug {
    /// Start a conversation seeded with `instruction_prompt` and the fixed
    /// acknowledgment turn.
    fn start_session(&self, instruction_prompt: &str) -> Arc<dyn ChatHandle>;
}
