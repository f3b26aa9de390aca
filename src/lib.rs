//! PreBot
//!
//! A chat page for engineering college admissions counselling. Each page
//! load gets an in-memory chat session whose replies stream from the Gemini
//! API into the transcript and out to the browser over SSE.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP server with a JSON session API and SSE events
//! - **Chat store**: transcript, typing flag and the streaming send operation
//! - **LLM client**: Gemini `streamGenerateContent` or an offline scripted client
//! - **UI**: server-rendered HTML plus a small inline client script
//!
//! # Modules
//!
//! - [`chat`]: chat sessions and their registry
//! - [`events`]: events published to the chat view
//! - [`llm`]: generative chat client traits and implementations
//! - [`markdown`]: Markdown rendering for bot replies
//! - [`ui`]: page shell and chat view

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::unused_async)]

pub mod chat;
pub mod config;
pub mod events;
pub mod llm;
pub mod markdown;
pub mod server;
pub mod ui;

use std::sync::Arc;

use crate::chat::{ChatStore, DEFAULT_INSTRUCTION_PROMPT, SessionOptions};
use crate::config::AppConfig;
use crate::llm::GenerativeChatClient;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Live chat sessions.
    pub sessions: ChatStore,
    /// Global configuration.
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Build the state around a chat client.
    #[must_use]
    pub fn new(config: Arc<AppConfig>, client: Arc<dyn GenerativeChatClient>) -> Self {
        let defaults = SessionOptions {
            instruction_prompt: DEFAULT_INSTRUCTION_PROMPT.to_string(),
            stream_timeout: config.llm.stream_timeout(),
        };

        Self {
            sessions: ChatStore::new(client, defaults),
            config,
        }
    }
}
