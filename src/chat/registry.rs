//! Registry of live chat sessions.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use uuid::Uuid;

use super::session::{ChatSession, SessionOptions};
use crate::llm::GenerativeChatClient;

/// Thread-safe map from session id to [`ChatSession`].
///
/// Every session created here shares one [`GenerativeChatClient`].
#[derive(Debug, Clone)]
pub struct ChatStore {
    inner: Arc<ChatStoreInner>,
}

#[derive(Debug)]
struct ChatStoreInner {
    sessions: RwLock<HashMap<String, ChatSession>>,
    client: Arc<dyn GenerativeChatClient>,
    defaults: SessionOptions,
}

impl ChatStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(client: Arc<dyn GenerativeChatClient>, defaults: SessionOptions) -> Self {
        Self {
            inner: Arc::new(ChatStoreInner {
                sessions: RwLock::new(HashMap::new()),
                client,
                defaults,
            }),
        }
    }

    /// Create a session, optionally with its own instruction prompt.
    pub fn create(&self, instruction_prompt: Option<String>) -> ChatSession {
        let id = Uuid::new_v4().to_string();
        let mut options = self.inner.defaults.clone();
        if let Some(prompt) = instruction_prompt {
            options.instruction_prompt = prompt;
        }

        let session = ChatSession::new(id.clone(), Arc::clone(&self.inner.client), options);
        self.write().insert(id, session.clone());

        tracing::info!(session_id = %session.id(), "Session created");
        session
    }

    /// Get a session by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ChatSession> {
        self.read().get(id).cloned()
    }

    /// Remove and close a session.
    pub fn remove(&self, id: &str) -> Option<ChatSession> {
        let removed = self.write().remove(id);
        if let Some(session) = &removed {
            session.close();
            tracing::info!(session_id = %id, "Session removed");
        }
        removed
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the store has no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All session ids.
    #[must_use]
    pub fn list_ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Remove sessions idle for longer than `ttl`.
    ///
    /// Returns the number of sessions removed.
    pub fn cleanup_expired(&self, ttl: Duration) -> usize {
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, session| {
            let expired = session.is_expired(ttl);
            if expired {
                session.close();
            }
            !expired
        });
        before - sessions.len()
    }

    /// Run [`cleanup_expired`](Self::cleanup_expired) every `interval`.
    pub fn spawn_sweeper(&self, ttl: Duration, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.cleanup_expired(ttl);
                if removed > 0 {
                    tracing::info!(removed, remaining = store.len(), "Expired sessions swept");
                }
            }
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ChatSession>> {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ChatSession>> {
        self.inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
