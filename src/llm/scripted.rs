//! In-process chat client that replays queued replies.
//!
//! Used by the test suite and by the `scripted` provider, which lets the site
//! run without network access. When the queue is empty the client echoes the
//! user's text back word by word.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{ChatHandle, ConversationHistory, FragmentStream, GenerativeChatClient, LlmError, Turn};

/// A queued reply for [`ScriptedChatClient`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedReply {
    fragments: Vec<String>,
    fail_after_fragments: Option<String>,
    reject: Option<String>,
    delay: Option<Duration>,
    hang: bool,
}

impl ScriptedReply {
    /// Reply that yields the given fragments, then ends.
    #[must_use]
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Reply that fails before any stream is returned.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            reject: Some(message.into()),
            ..Self::default()
        }
    }

    /// Yield an error after the fragments instead of ending cleanly.
    #[must_use]
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.fail_after_fragments = Some(message.into());
        self
    }

    /// Never end after the fragments.
    #[must_use]
    pub fn then_hang(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Sleep before each fragment.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn echo(text: &str) -> Self {
        let reply = format!("PreBot is running offline. You said: {text}");
        let mut fragments = Vec::new();
        let mut current = String::new();
        for ch in reply.chars() {
            current.push(ch);
            if ch == ' ' {
                fragments.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            fragments.push(current);
        }
        Self::fragments(fragments)
    }
}

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<ScriptedReply>,
    prompts: Vec<String>,
    sent: Vec<String>,
}

/// Client that replays [`ScriptedReply`]s in order, shared by all of its
/// sessions.
#[derive(Debug, Clone, Default)]
pub struct ScriptedChatClient {
    script: Arc<Mutex<Script>>,
}

impl ScriptedChatClient {
    /// Create a client with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next send.
    pub fn push_reply(&self, reply: ScriptedReply) {
        self.lock().replies.push_back(reply);
    }

    /// Instruction prompts of every session started so far.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.lock().prompts.clone()
    }

    /// User texts of every send so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GenerativeChatClient for ScriptedChatClient {
    fn start_session(&self, instruction_prompt: &str) -> Arc<dyn ChatHandle> {
        self.lock().prompts.push(instruction_prompt.to_string());
        Arc::new(ScriptedChat {
            client: self.clone(),
            history: ConversationHistory::seeded(instruction_prompt),
        })
    }
}

#[derive(Debug)]
struct ScriptedChat {
    client: ScriptedChatClient,
    history: ConversationHistory,
}

#[async_trait::async_trait]
impl ChatHandle for ScriptedChat {
    async fn send_streamed(&self, text: &str) -> Result<FragmentStream, LlmError> {
        let mut reply = {
            let mut script = self.client.lock();
            script.sent.push(text.to_string());
            script
                .replies
                .pop_front()
                .unwrap_or_else(|| ScriptedReply::echo(text))
        };

        if let Some(message) = reply.reject.take() {
            return Err(LlmError::Scripted(message));
        }

        let history = self.history.clone();
        let user_text = text.to_string();

        let out: FragmentStream = Box::pin(async_stream::try_stream! {
            let mut accumulated = String::new();
            for fragment in reply.fragments {
                if let Some(delay) = reply.delay {
                    tokio::time::sleep(delay).await;
                }
                accumulated.push_str(&fragment);
                yield fragment;
            }

            if let Some(message) = reply.fail_after_fragments {
                Err::<(), _>(LlmError::Scripted(message))?;
            }

            if reply.hang {
                futures::future::pending::<()>().await;
            }

            history.record_exchange(user_text, accumulated).await;
        });

        Ok(out)
    }

    async fn history(&self) -> Vec<Turn> {
        self.history.snapshot().await
    }
}
