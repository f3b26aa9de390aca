//! Chat session store.
//!
//! A [`ChatSession`] owns the transcript, the typing flag and the draft of
//! one visitor's conversation. Sending a message appends the user message
//! and an empty bot placeholder, then fills the placeholder in place as the
//! reply streams in.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use prebot::chat::{ChatStore, SendOutcome, SessionOptions};
//! use prebot::llm::{ScriptedChatClient, ScriptedReply};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let client = ScriptedChatClient::new();
//! client.push_reply(ScriptedReply::fragments(["Sure, ", "let's start."]));
//!
//! let store = ChatStore::new(Arc::new(client), SessionOptions::default());
//! let session = store.create(None);
//!
//! let outcome = session.send_message("Predict my rank").await;
//! assert!(matches!(outcome, SendOutcome::Sent { .. }));
//! assert_eq!(session.messages()[1].text(), "Sure, let's start.");
//! assert!(!session.is_typing());
//! # });
//! ```

mod message;
pub mod prompt;
mod registry;
mod session;
mod transcript;

pub use message::{ChatMessage, MessageId, Sender};
pub use prompt::{DEFAULT_INSTRUCTION_PROMPT, QUICK_ACTIONS, SUGGESTIONS};
pub use registry::ChatStore;
pub use session::{
    CANCELLED_NOTICE, ChatSession, DEFAULT_STREAM_TIMEOUT, ERROR_NOTICE, PendingSend, SendOutcome,
    SendPermit, SendReceipt, SessionOptions, SessionSnapshot, StreamEnd,
};
pub use transcript::{Transcript, TranscriptError};
