//! Chat view: sidebar, transcript, composer and the client script.
//!
//! The server renders each message bubble; the script only swaps bubbles by
//! id as session events arrive.

use crate::chat::{ChatMessage, QUICK_ACTIONS, SUGGESTIONS, Sender};
use crate::markdown::{escape_html, render_markdown};

/// Render one message bubble.
///
/// Bot text goes through the Markdown renderer; user text is escaped and
/// shown verbatim.
#[must_use]
pub fn render_message(message: &ChatMessage) -> String {
    let (class, avatar, body) = match message.sender() {
        Sender::User => (
            "user",
            "You",
            format!("<p>{}</p>", escape_html(message.text())),
        ),
        Sender::Bot => ("bot", "Bot", render_markdown(message.text())),
    };
    let id = message.id();
    let time = message.formatted_time();
    let stamp = message.rfc3339_timestamp();

    format!(
        r#"<div class="message {class}" id="msg-{id}" data-id="{id}"><div class="message-row"><div class="message-avatar">{avatar}</div><div class="bubble markdown-content">{body}<p class="time" data-timestamp="{stamp}">{time}</p></div></div></div>"#
    )
}

fn shortcut_button(class: &str, text: &str, arrow: bool) -> String {
    let text = escape_html(text);
    let arrow = if arrow { "<span aria-hidden=\"true\">&rarr;</span>" } else { "" };
    format!(r#"<button type="button" class="{class}" data-shortcut="{text}">{text}{arrow}</button>"#)
}

fn sidebar() -> String {
    let actions: String = QUICK_ACTIONS
        .iter()
        .map(|action| shortcut_button("quick-action", action, true))
        .collect();

    format!(
        r#"<aside class="sidebar">
    <h2>PreBot</h2>
    <p>PreBot is your smart and friendly AI counselor that helps you navigate engineering college admissions.</p>
    <p>From predicting colleges based on your JEE rank to exploring campus details or connecting with seniors, PreBot is here to guide you every step of the way.</p>
    <div class="quick-actions">{actions}</div>
</aside>"#
    )
}

fn empty_state() -> String {
    let suggestions: String = SUGGESTIONS
        .iter()
        .map(|suggestion| shortcut_button("suggestion", suggestion, false))
        .collect();

    format!(
        r#"<div class="empty-state" id="empty-state">
    <p>Hi! I'm <span class="accent">PreBot</span>, your PreCollege AI counselor.<br>How can I help you with your engineering college counselling today?</p>
    <div class="suggestions">{suggestions}</div>
    <p class="hint">Got something else on your mind? Just type your question in the chatbox!</p>
</div>"#
    )
}

/// The chat widget.
#[must_use]
pub fn chat_view() -> String {
    let sidebar = sidebar();
    let empty_state = empty_state();

    format!(
        r#"<div class="chat-layout">
{sidebar}
<section class="chat-panel" aria-label="PreBot chat">
    <div class="transcript" id="transcript" aria-live="polite">
        {empty_state}
        <div id="messages"></div>
    </div>
    <div class="typing-indicator" id="typing-indicator" hidden>PreBot is typing&hellip;</div>
    <div class="composer">
        <form id="composer" autocomplete="off">
            <input type="text" id="message-input" name="message" placeholder="What's on your mind? Let PreBot help you...">
            <button type="button" id="stop-button" hidden>Stop</button>
            <button type="submit" id="send-button" aria-label="Send" disabled>&#10148;</button>
        </form>
    </div>
</section>
</div>
<script>{CLIENT_SCRIPT}</script>"#
    )
}

const CLIENT_SCRIPT: &str = r"
(() => {
  const transcript = document.getElementById('transcript');
  const messages = document.getElementById('messages');
  const emptyState = document.getElementById('empty-state');
  const typing = document.getElementById('typing-indicator');
  const form = document.getElementById('composer');
  const input = document.getElementById('message-input');
  const sendButton = document.getElementById('send-button');
  const stopButton = document.getElementById('stop-button');
  let sessionId = null;
  let isTyping = false;
  let draftTimer = null;

  const api = (path, method, body) => fetch('/api/sessions/' + sessionId + path, {
    method,
    headers: { 'content-type': 'application/json' },
    body: body === undefined ? undefined : JSON.stringify(body),
    keepalive: method === 'DELETE',
  });

  function refreshControls() {
    input.disabled = isTyping;
    sendButton.disabled = isTyping || !input.value.trim();
    stopButton.hidden = !isTyping;
    typing.hidden = !isTyping;
  }

  const timeFormat = { hour: '2-digit', minute: '2-digit' };

  function localizeTime(node) {
    node.querySelectorAll('[data-timestamp]').forEach((el) => {
      el.textContent = new Date(el.dataset.timestamp).toLocaleTimeString([], timeFormat);
    });
  }

  function upsert(view) {
    const template = document.createElement('template');
    template.innerHTML = view.html.trim();
    const node = template.content.firstElementChild;
    localizeTime(node);
    const existing = document.getElementById('msg-' + view.id);
    if (existing) {
      existing.replaceWith(node);
    } else {
      messages.appendChild(node);
    }
    emptyState.hidden = true;
  }

  function apply(event) {
    switch (event.type) {
      case 'snapshot':
        messages.replaceChildren();
        event.data.messages.forEach(upsert);
        emptyState.hidden = event.data.messages.length > 0;
        if (document.activeElement !== input) input.value = event.data.draft;
        isTyping = event.data.is_typing;
        break;
      case 'message.appended':
      case 'message.updated':
        upsert(event.data);
        break;
      case 'typing':
        isTyping = event.data.is_typing;
        if (!isTyping) input.focus();
        break;
    }
    refreshControls();
    transcript.scrollTop = transcript.scrollHeight;
  }

  async function send(text) {
    if (!sessionId || isTyping || !text.trim()) return;
    input.value = '';
    refreshControls();
    await api('/messages', 'POST', { message: text });
  }

  async function start() {
    const response = await fetch('/api/sessions', {
      method: 'POST',
      headers: { 'content-type': 'application/json' },
      body: '{}',
    });
    sessionId = (await response.json()).session_id;
    const source = new EventSource('/api/sessions/' + sessionId + '/events');
    for (const name of ['snapshot', 'message.appended', 'message.updated', 'typing']) {
      source.addEventListener(name, (e) => apply(JSON.parse(e.data)));
    }
  }

  form.addEventListener('submit', (e) => {
    e.preventDefault();
    send(input.value);
  });
  input.addEventListener('input', () => {
    refreshControls();
    clearTimeout(draftTimer);
    draftTimer = setTimeout(() => {
      if (sessionId) api('/draft', 'PUT', { text: input.value });
    }, 300);
  });
  stopButton.addEventListener('click', () => api('/cancel', 'POST'));
  document.querySelectorAll('[data-shortcut]').forEach((button) => {
    button.addEventListener('click', () => send(button.dataset.shortcut));
  });
  window.addEventListener('pagehide', () => {
    if (sessionId) api('', 'DELETE');
  });

  start();
})();
";
