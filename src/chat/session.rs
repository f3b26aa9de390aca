//! A single chat session and its send operation.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast};
use tokio_util::sync::CancellationToken;

use super::message::{ChatMessage, MessageId};
use super::prompt::DEFAULT_INSTRUCTION_PROMPT;
use super::transcript::{Transcript, TranscriptError};
use crate::events::{ChatEvent, MessageView};
use crate::llm::{ChatHandle, GenerativeChatClient, LlmError, Turn};

/// Text written to a bot message whose stream failed.
pub const ERROR_NOTICE: &str = "An error occurred. Please try again.";

/// Text written to a bot message cancelled before any fragment arrived.
pub const CANCELLED_NOTICE: &str = "Response cancelled.";

/// Default idle timeout between reply fragments.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(60);

const EVENT_CAPACITY: usize = 256;

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Prompt that seeds the conversation history.
    pub instruction_prompt: String,
    /// Maximum wait for the stream to start and between fragments;
    /// `None` waits indefinitely.
    pub stream_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            instruction_prompt: DEFAULT_INSTRUCTION_PROMPT.to_string(),
            stream_timeout: Some(DEFAULT_STREAM_TIMEOUT),
        }
    }
}

/// Ids of the two messages appended by one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    /// The user message.
    pub user_message_id: MessageId,
    /// The bot placeholder.
    pub bot_message_id: MessageId,
}

/// How a reply stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEnd {
    /// All fragments arrived.
    Completed,
    /// The stream failed or timed out; the error notice was written.
    Failed,
    /// The send was cancelled.
    Cancelled,
}

/// Result of [`ChatSession::send_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The text trimmed to empty; nothing happened.
    Ignored,
    /// Two messages were appended and the reply stream resolved.
    Sent {
        /// Appended message ids.
        receipt: SendReceipt,
        /// How the stream ended.
        end: StreamEnd,
    },
}

/// Point-in-time copy of a session's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Session id.
    pub id: String,
    /// Transcript in order.
    pub messages: Vec<ChatMessage>,
    /// Typing flag.
    pub is_typing: bool,
    /// Unsent input text.
    pub draft: String,
    /// Session creation time.
    pub created_at: DateTime<Utc>,
}

/// Exclusive right to start a send on one session.
///
/// The session itself never checks whether a send is in flight; callers
/// that accept concurrent requests take this permit first.
#[derive(Debug)]
pub struct SendPermit(#[allow(dead_code)] OwnedSemaphorePermit);

/// Chat session state shared by request handlers and the send task.
///
/// Cloning is cheap and shares the same session.
#[derive(Debug, Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: String,
    created_at: DateTime<Utc>,
    client: Arc<dyn GenerativeChatClient>,
    stream_timeout: Option<Duration>,
    state: RwLock<SessionState>,
    events: broadcast::Sender<ChatEvent>,
    send_gate: Arc<Semaphore>,
    closed: CancellationToken,
}

#[derive(Debug)]
struct SessionState {
    transcript: Transcript,
    is_typing: bool,
    draft: String,
    instruction_prompt: String,
    handle: Arc<dyn ChatHandle>,
    cancel: Option<CancellationToken>,
    last_activity: DateTime<Utc>,
}

impl SessionState {
    fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

enum Interrupt {
    Cancelled,
    Failed(LlmError),
}

impl ChatSession {
    /// Create a session and start its conversation.
    pub fn new(
        id: impl Into<String>,
        client: Arc<dyn GenerativeChatClient>,
        options: SessionOptions,
    ) -> Self {
        let handle = client.start_session(&options.instruction_prompt);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let now = Utc::now();

        Self {
            inner: Arc::new(SessionInner {
                id: id.into(),
                created_at: now,
                client,
                stream_timeout: options.stream_timeout,
                state: RwLock::new(SessionState {
                    transcript: Transcript::new(),
                    is_typing: false,
                    draft: String::new(),
                    instruction_prompt: options.instruction_prompt,
                    handle,
                    cancel: None,
                    last_activity: now,
                }),
                events,
                send_gate: Arc::new(Semaphore::new(1)),
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Whether a reply is streaming.
    #[must_use]
    pub fn is_typing(&self) -> bool {
        self.read().is_typing
    }

    /// Current draft.
    #[must_use]
    pub fn draft(&self) -> String {
        self.read().draft.clone()
    }

    /// Current instruction prompt.
    #[must_use]
    pub fn instruction_prompt(&self) -> String {
        self.read().instruction_prompt.clone()
    }

    /// Copy of the transcript.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.read().transcript.messages().to_vec()
    }

    /// Number of messages in the transcript.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.read().transcript.len()
    }

    /// Copy of the whole session state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.read();
        SessionSnapshot {
            id: self.inner.id.clone(),
            messages: state.transcript.messages().to_vec(),
            is_typing: state.is_typing,
            draft: state.draft.clone(),
            created_at: self.inner.created_at,
        }
    }

    /// The session state as a [`ChatEvent::Snapshot`].
    #[must_use]
    pub fn snapshot_event(&self) -> ChatEvent {
        snapshot_event(&self.read())
    }

    /// Subscribe to session events.
    ///
    /// The snapshot and the receiver are taken atomically: every event
    /// received afterwards describes a change the snapshot does not include.
    #[must_use]
    pub fn subscribe(&self) -> (ChatEvent, broadcast::Receiver<ChatEvent>) {
        let state = self.read();
        let rx = self.inner.events.subscribe();
        (snapshot_event(&state), rx)
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.events.receiver_count()
    }

    /// Conversation history held by the current chat handle.
    pub async fn history(&self) -> Vec<Turn> {
        let handle = Arc::clone(&self.read().handle);
        handle.history().await
    }

    /// Replace the unsent input text.
    pub fn set_draft(&self, text: impl Into<String>) {
        let mut state = self.write();
        state.draft = text.into();
        state.touch();
    }

    /// Replace the instruction prompt and restart the conversation history.
    ///
    /// The transcript is kept. A send already in flight finishes on the old
    /// conversation.
    pub fn set_instruction_prompt(&self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        let handle = self.inner.client.start_session(&prompt);

        let mut state = self.write();
        state.instruction_prompt = prompt;
        state.handle = handle;
        state.touch();

        tracing::info!(session_id = %self.inner.id, "Instruction prompt replaced");
    }

    /// Try to take the send permit. Returns `None` while another send holds it.
    #[must_use]
    pub fn try_acquire_send(&self) -> Option<SendPermit> {
        Arc::clone(&self.inner.send_gate)
            .try_acquire_owned()
            .ok()
            .map(SendPermit)
    }

    /// Cancel the in-flight send, if any.
    ///
    /// Returns `true` if a send was running.
    pub fn cancel(&self) -> bool {
        let token = self.read().cancel.clone();
        match token {
            Some(token) => {
                token.cancel();
                tracing::info!(session_id = %self.inner.id, "Send cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Close the session: cancel the in-flight send and end event streams
    /// waiting on [`closed`](Self::closed).
    pub fn close(&self) {
        self.inner.closed.cancel();
        self.cancel();
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Resolves once the session is closed.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await;
    }

    /// Whether the session has been idle for longer than `ttl`.
    ///
    /// Sessions with a streaming reply or a connected view never expire.
    #[must_use]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        let state = self.read();
        if state.is_typing || self.inner.events.receiver_count() > 0 {
            return false;
        }
        (Utc::now() - state.last_activity)
            .to_std()
            .is_ok_and(|idle| idle > ttl)
    }

    /// Send a user message and stream the reply into the transcript.
    ///
    /// Input that trims to empty is ignored. Stream failures are not
    /// returned as errors: they end up as [`ERROR_NOTICE`] in the bot
    /// message and as [`StreamEnd::Failed`].
    pub async fn send_message(&self, text: &str) -> SendOutcome {
        match self.begin_send(text) {
            Some(pending) => {
                let receipt = pending.receipt();
                let end = pending.run().await;
                SendOutcome::Sent { receipt, end }
            }
            None => SendOutcome::Ignored,
        }
    }

    /// Append the user message and the placeholder and mark the session as
    /// typing. The returned [`PendingSend`] streams the reply when run.
    ///
    /// Returns `None` for input that trims to empty.
    #[must_use]
    pub fn begin_send(&self, text: &str) -> Option<PendingSend> {
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!(session_id = %self.inner.id, "Ignoring empty message");
            return None;
        }

        let (receipt, handle, cancel) = match self.open_exchange(text) {
            Ok(opened) => opened,
            Err(e) => {
                tracing::error!(session_id = %self.inner.id, error = %e, "Failed to open exchange");
                return None;
            }
        };

        tracing::info!(
            session_id = %self.inner.id,
            user_message_id = %receipt.user_message_id,
            bot_message_id = %receipt.bot_message_id,
            message_length = text.len(),
            "Message accepted"
        );

        Some(PendingSend {
            session: self.clone(),
            receipt,
            text: text.to_string(),
            handle,
            cancel,
            permit: None,
        })
    }

    fn open_exchange(
        &self,
        text: &str,
    ) -> Result<(SendReceipt, Arc<dyn ChatHandle>, CancellationToken), TranscriptError> {
        let mut state = self.write();

        let user = ChatMessage::user(text);
        let user_view = MessageView::from(&user);
        let user_message_id = state.transcript.push(user)?;
        self.publish(ChatEvent::MessageAppended(user_view));

        state.draft.clear();

        state.is_typing = true;
        self.publish(ChatEvent::Typing { is_typing: true });

        let placeholder = ChatMessage::bot_placeholder();
        let placeholder_view = MessageView::from(&placeholder);
        let bot_message_id = state.transcript.push(placeholder)?;
        self.publish(ChatEvent::MessageAppended(placeholder_view));

        let cancel = CancellationToken::new();
        state.cancel = Some(cancel.clone());
        state.touch();

        let receipt = SendReceipt {
            user_message_id,
            bot_message_id,
        };
        Ok((receipt, Arc::clone(&state.handle), cancel))
    }

    async fn drive(
        &self,
        handle: &Arc<dyn ChatHandle>,
        text: &str,
        bot_id: MessageId,
        cancel: &CancellationToken,
    ) -> Result<(), Interrupt> {
        let idle = self.inner.stream_timeout;

        let mut stream = guarded(handle.send_streamed(text), cancel, idle)
            .await?
            .map_err(Interrupt::Failed)?;

        while let Some(item) = guarded(stream.next(), cancel, idle).await? {
            let fragment = item.map_err(Interrupt::Failed)?;
            self.append_fragment(bot_id, &fragment);
        }

        Ok(())
    }

    fn append_fragment(&self, bot_id: MessageId, fragment: &str) {
        if fragment.is_empty() {
            return;
        }

        let mut state = self.write();
        match state.transcript.append_text(bot_id, fragment) {
            Ok(message) => {
                let view = MessageView::from(message);
                self.publish(ChatEvent::MessageUpdated(view));
            }
            Err(e) => {
                tracing::warn!(session_id = %self.inner.id, error = %e, "Dropped reply fragment");
            }
        }
    }

    /// Write the final notice (if any) and clear the typing flag.
    fn settle(&self, bot_id: MessageId, end: StreamEnd) {
        let mut state = self.write();

        let current = state
            .transcript
            .get(bot_id)
            .map(|m| m.text().to_string())
            .unwrap_or_default();

        let replacement = match end {
            StreamEnd::Completed => None,
            StreamEnd::Failed => Some(with_notice(&current, ERROR_NOTICE)),
            StreamEnd::Cancelled => current
                .trim()
                .is_empty()
                .then(|| CANCELLED_NOTICE.to_string()),
        };

        if let Some(text) = replacement {
            match state.transcript.set_text(bot_id, text) {
                Ok(message) => {
                    let view = MessageView::from(message);
                    self.publish(ChatEvent::MessageUpdated(view));
                }
                Err(e) => {
                    tracing::warn!(session_id = %self.inner.id, error = %e, "Could not write notice");
                }
            }
        }

        state.is_typing = false;
        state.cancel = None;
        state.touch();
        self.publish(ChatEvent::Typing { is_typing: false });
    }

    /// Publish while the state lock is held so subscribers see mutation order.
    fn publish(&self, event: ChatEvent) {
        // No receivers is not an error.
        let _ = self.inner.events.send(event);
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A send whose messages are in the transcript but whose reply has not been
/// streamed yet.
#[derive(Debug)]
#[must_use = "the reply is only streamed when the pending send is run"]
pub struct PendingSend {
    session: ChatSession,
    receipt: SendReceipt,
    text: String,
    handle: Arc<dyn ChatHandle>,
    cancel: CancellationToken,
    permit: Option<SendPermit>,
}

impl PendingSend {
    /// Ids of the appended messages.
    pub fn receipt(&self) -> SendReceipt {
        self.receipt
    }

    /// Keep `permit` until the reply resolves.
    pub fn hold(mut self, permit: SendPermit) -> Self {
        self.permit = Some(permit);
        self
    }

    /// Stream the reply into the placeholder.
    pub async fn run(self) -> StreamEnd {
        let Self {
            session,
            receipt,
            text,
            handle,
            cancel,
            permit,
        } = self;
        let bot_id = receipt.bot_message_id;
        let session_id = session.id().to_string();

        let end = match session.drive(&handle, &text, bot_id, &cancel).await {
            Ok(()) => {
                tracing::info!(session_id = %session_id, bot_message_id = %bot_id, "Reply complete");
                StreamEnd::Completed
            }
            Err(Interrupt::Cancelled) => {
                tracing::info!(session_id = %session_id, bot_message_id = %bot_id, "Reply cancelled");
                StreamEnd::Cancelled
            }
            Err(Interrupt::Failed(e)) => {
                tracing::error!(
                    session_id = %session_id,
                    bot_message_id = %bot_id,
                    error = %e,
                    "Streaming reply failed"
                );
                StreamEnd::Failed
            }
        };

        session.settle(bot_id, end);
        drop(permit);
        end
    }
}

/// Await `fut` unless the send is cancelled or the idle timeout passes.
async fn guarded<F: Future>(
    fut: F,
    cancel: &CancellationToken,
    idle: Option<Duration>,
) -> Result<F::Output, Interrupt> {
    let Some(limit) = idle else {
        return tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Interrupt::Cancelled),
            out = fut => Ok(out),
        };
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Interrupt::Cancelled),
        res = tokio::time::timeout(limit, fut) => {
            res.map_err(|_elapsed| Interrupt::Failed(LlmError::Timeout(limit)))
        }
    }
}

/// Keep delivered text and put the notice after it as its own paragraph.
fn with_notice(partial: &str, notice: &str) -> String {
    let partial = partial.trim_end();
    if partial.trim().is_empty() {
        notice.to_string()
    } else {
        format!("{partial}\n\n{notice}")
    }
}

fn snapshot_event(state: &SessionState) -> ChatEvent {
    ChatEvent::Snapshot {
        messages: state
            .transcript
            .messages()
            .iter()
            .map(MessageView::from)
            .collect(),
        is_typing: state.is_typing,
        draft: state.draft.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::chat::Sender;
    use crate::chat::prompt::QUICK_ACTIONS;
    use crate::llm::{ScriptedChatClient, ScriptedReply};

    fn session_with(client: &ScriptedChatClient) -> ChatSession {
        ChatSession::new("test", Arc::new(client.clone()), SessionOptions::default())
    }

    fn texts(session: &ChatSession) -> Vec<(Sender, String)> {
        session
            .messages()
            .iter()
            .map(|m| (m.sender(), m.text().to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_send_appends_user_then_bot() {
        let client = ScriptedChatClient::new();
        client.push_reply(ScriptedReply::fragments(["Hi there"]));
        let session = session_with(&client);

        let outcome = session.send_message("  Hello  ").await;

        let SendOutcome::Sent { receipt, end } = outcome else {
            panic!("expected a send, got {outcome:?}");
        };
        assert_eq!(end, StreamEnd::Completed);

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id(), receipt.user_message_id);
        assert_eq!(messages[0].sender(), Sender::User);
        assert_eq!(messages[0].text(), "Hello");
        assert_eq!(messages[1].id(), receipt.bot_message_id);
        assert_eq!(messages[1].sender(), Sender::Bot);
        assert_eq!(messages[1].text(), "Hi there");
        assert_eq!(client.sent(), vec!["Hello"]);
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let client = ScriptedChatClient::new();
        let session = session_with(&client);

        for blank in ["", "   ", "\n\t "] {
            assert_eq!(session.send_message(blank).await, SendOutcome::Ignored);
        }

        assert_eq!(session.message_count(), 0);
        assert!(!session.is_typing());
        assert!(client.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_clears_draft() {
        let client = ScriptedChatClient::new();
        client.push_reply(ScriptedReply::fragments(["ok"]));
        let session = session_with(&client);

        session.set_draft("Predict colleges");
        assert_eq!(session.draft(), "Predict colleges");

        session.send_message("Predict colleges").await;
        assert_eq!(session.draft(), "");
    }

    #[tokio::test]
    async fn test_fragments_accumulate_in_order() {
        let client = ScriptedChatClient::new();
        client.push_reply(ScriptedReply::fragments(["Hel", "lo"]));
        let session = session_with(&client);
        let (_, mut rx) = session.subscribe();

        session.send_message("Hi").await;

        let mut updates = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ChatEvent::MessageUpdated(view) = event {
                updates.push(view.text);
            }
        }
        assert_eq!(updates, vec!["Hel", "Hello"]);
        assert_eq!(session.messages()[1].text(), "Hello");
    }

    #[tokio::test]
    async fn test_event_order_for_one_send() {
        let client = ScriptedChatClient::new();
        client.push_reply(ScriptedReply::fragments(["A"]));
        let session = session_with(&client);
        let (snapshot, mut rx) = session.subscribe();
        assert!(matches!(snapshot, ChatEvent::Snapshot { ref messages, .. } if messages.is_empty()));

        session.send_message("Q").await;

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        assert_eq!(
            names,
            vec![
                "message.appended",
                "typing",
                "message.appended",
                "message.updated",
                "typing",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_only_while_streaming() {
        let client = ScriptedChatClient::new();
        client.push_reply(
            ScriptedReply::fragments(["Sure, ", "let's start."]).with_delay(Duration::from_secs(1)),
        );
        let session = session_with(&client);
        assert!(!session.is_typing());

        let pending = session.begin_send("Predict my rank").unwrap();
        assert!(session.is_typing());
        assert_eq!(session.messages()[1].text(), "");

        let task = tokio::spawn(pending.run());
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(session.is_typing());
        assert_eq!(session.messages()[1].text(), "Sure, ");

        assert_eq!(task.await.unwrap(), StreamEnd::Completed);
        assert!(!session.is_typing());
        assert_eq!(session.messages()[1].text(), "Sure, let's start.");
    }

    #[tokio::test]
    async fn test_error_mid_stream_keeps_partial_text() {
        let client = ScriptedChatClient::new();
        client.push_reply(ScriptedReply::fragments(["Par", "tial "]).then_fail("connection reset"));
        let session = session_with(&client);

        let outcome = session.send_message("Hi").await;

        assert!(matches!(outcome, SendOutcome::Sent { end: StreamEnd::Failed, .. }));
        assert_eq!(
            session.messages()[1].text(),
            "Partial\n\nAn error occurred. Please try again."
        );
        assert!(!session.is_typing());
    }

    #[tokio::test]
    async fn test_error_before_stream_writes_notice_only() {
        let client = ScriptedChatClient::new();
        client.push_reply(ScriptedReply::rejected("bad key"));
        let session = session_with(&client);

        session.send_message("Hi").await;

        assert_eq!(session.messages()[1].text(), ERROR_NOTICE);
        assert!(!session.is_typing());
    }

    #[tokio::test]
    async fn test_empty_stream_leaves_empty_reply() {
        let client = ScriptedChatClient::new();
        client.push_reply(ScriptedReply::fragments(Vec::<String>::new()));
        let session = session_with(&client);

        let outcome = session.send_message("Hi").await;

        assert!(matches!(outcome, SendOutcome::Sent { end: StreamEnd::Completed, .. }));
        assert_eq!(session.messages()[1].text(), "");
        assert!(!session.is_typing());
    }

    #[tokio::test]
    async fn test_session_usable_after_failure() {
        let client = ScriptedChatClient::new();
        client.push_reply(ScriptedReply::rejected("down"));
        client.push_reply(ScriptedReply::fragments(["Back online"]));
        let session = session_with(&client);

        session.send_message("first").await;
        session.send_message("second").await;

        assert_eq!(session.messages()[3].text(), "Back online");
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_fails_the_send() {
        let client = ScriptedChatClient::new();
        client.push_reply(ScriptedReply::fragments(["Half"]).then_hang());
        let options = SessionOptions {
            stream_timeout: Some(Duration::from_secs(5)),
            ..SessionOptions::default()
        };
        let session = ChatSession::new("t", Arc::new(client.clone()), options);

        let outcome = session.send_message("Hi").await;

        assert!(matches!(outcome, SendOutcome::Sent { end: StreamEnd::Failed, .. }));
        assert_eq!(
            session.messages()[1].text(),
            format!("Half\n\n{ERROR_NOTICE}")
        );
        assert!(!session.is_typing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_stream_timeout_waits_for_slow_fragments() {
        let client = ScriptedChatClient::new();
        client.push_reply(
            ScriptedReply::fragments(["Slow ", "reply"]).with_delay(Duration::from_secs(600)),
        );
        let options = SessionOptions {
            stream_timeout: None,
            ..SessionOptions::default()
        };
        let session = ChatSession::new("t", Arc::new(client.clone()), options);

        let outcome = session.send_message("Hi").await;

        assert!(matches!(outcome, SendOutcome::Sent { end: StreamEnd::Completed, .. }));
        assert_eq!(session.messages()[1].text(), "Slow reply");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_keeps_delivered_text() {
        let client = ScriptedChatClient::new();
        client.push_reply(ScriptedReply::fragments(["Thinking"]).then_hang());
        let session = session_with(&client);

        let pending = session.begin_send("Hi").unwrap();
        let task = tokio::spawn(pending.run());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(session.cancel());
        assert_eq!(task.await.unwrap(), StreamEnd::Cancelled);
        assert_eq!(session.messages()[1].text(), "Thinking");
        assert!(!session.is_typing());
        assert!(!session.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_any_fragment() {
        let client = ScriptedChatClient::new();
        client.push_reply(
            ScriptedReply::fragments(["late"]).with_delay(Duration::from_secs(30)),
        );
        let session = session_with(&client);

        let pending = session.begin_send("Hi").unwrap();
        let task = tokio::spawn(pending.run());
        tokio::time::sleep(Duration::from_millis(10)).await;
        session.cancel();

        assert_eq!(task.await.unwrap(), StreamEnd::Cancelled);
        assert_eq!(session.messages()[1].text(), CANCELLED_NOTICE);
    }

    #[tokio::test]
    async fn test_ids_unique_across_sends() {
        let client = ScriptedChatClient::new();
        let session = session_with(&client);

        for i in 0..20 {
            session.send_message(&format!("message {i}")).await;
        }

        let ids: HashSet<MessageId> = session.messages().iter().map(ChatMessage::id).collect();
        assert_eq!(ids.len(), 40);
    }

    #[tokio::test]
    async fn test_quick_action_scenario() {
        let client = ScriptedChatClient::new();
        client.push_reply(ScriptedReply::fragments(["Sure, let's start."]));
        let session = session_with(&client);

        session.send_message(QUICK_ACTIONS[0]).await;

        assert_eq!(
            texts(&session),
            vec![
                (Sender::User, "Predict my rank".to_string()),
                (Sender::Bot, "Sure, let's start.".to_string()),
            ]
        );
        assert!(!session.is_typing());
    }

    #[tokio::test]
    async fn test_sequential_sends_do_not_interleave() {
        let client = ScriptedChatClient::new();
        client.push_reply(ScriptedReply::fragments(["reply ", "A"]));
        client.push_reply(ScriptedReply::fragments(["reply ", "B"]));
        let session = session_with(&client);

        session.send_message("A").await;
        session.send_message("B").await;

        assert_eq!(
            texts(&session),
            vec![
                (Sender::User, "A".to_string()),
                (Sender::Bot, "reply A".to_string()),
                (Sender::User, "B".to_string()),
                (Sender::Bot, "reply B".to_string()),
            ]
        );
        assert_eq!(session.history().await.len(), 6);
    }

    #[tokio::test]
    async fn test_send_permit_is_exclusive() {
        let client = ScriptedChatClient::new();
        let session = session_with(&client);

        let permit = session.try_acquire_send().unwrap();
        assert!(session.try_acquire_send().is_none());

        drop(permit);
        assert!(session.try_acquire_send().is_some());
    }

    #[tokio::test]
    async fn test_prompt_change_restarts_history() {
        let client = ScriptedChatClient::new();
        client.push_reply(ScriptedReply::fragments(["one"]));
        let session = session_with(&client);
        session.send_message("Hi").await;
        assert_eq!(session.history().await.len(), 4);

        session.set_instruction_prompt("Answer in one line.");

        let history = session.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], Turn::user("Answer in one line."));
        assert_eq!(session.message_count(), 2);
        assert_eq!(client.prompts().len(), 2);
    }

    #[test]
    fn test_with_notice() {
        assert_eq!(with_notice("", ERROR_NOTICE), ERROR_NOTICE);
        assert_eq!(with_notice("  \n", ERROR_NOTICE), ERROR_NOTICE);
        assert_eq!(
            with_notice("| a |\n", ERROR_NOTICE),
            format!("| a |\n\n{ERROR_NOTICE}")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_send() {
        let client = ScriptedChatClient::new();
        client.push_reply(ScriptedReply::fragments(["Hi"]).then_hang());
        let session = session_with(&client);

        let task = tokio::spawn(session.begin_send("Hello").unwrap().run());
        tokio::time::sleep(Duration::from_millis(10)).await;
        session.close();

        assert!(session.is_closed());
        session.closed().await;
        assert_eq!(task.await.unwrap(), StreamEnd::Cancelled);
    }

    #[tokio::test]
    async fn test_expiry_respects_subscribers() {
        let client = ScriptedChatClient::new();
        let session = session_with(&client);

        assert!(!session.is_expired(Duration::from_secs(60)));
        let (_, rx) = session.subscribe();
        assert!(!session.is_expired(Duration::ZERO));
        drop(rx);
        assert!(!session.is_expired(Duration::from_secs(3600)));
    }
}
