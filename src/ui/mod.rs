//! Server-rendered HTML.
//!
//! # Structure
//!
//! - [`shell`]: page frame, navbar and footer
//! - [`chat`]: the chat widget and its client script

pub mod chat;
pub mod shell;

/// The full PreBot page.
#[must_use]
pub fn render_page() -> String {
    shell::page("PreBot - Precollege AI counselor", &chat::chat_view())
}
