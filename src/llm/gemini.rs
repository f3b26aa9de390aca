//! Google Generative Language API client.
//!
//! This module implements [`GenerativeChatClient`] on top of the
//! `streamGenerateContent` endpoint with `alt=sse`, yielding the text of each
//! streamed `GenerateContentResponse` as one fragment.

use std::sync::Arc;

use futures::StreamExt;
use serde::Deserialize;
use url::Url;

use super::{
    ChatHandle, ConversationHistory, FragmentStream, GenerativeChatClient, LlmError, Role, Turn,
};

/// Default API host.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Finish reasons after which the candidate text must not be shown.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "OTHER",
];

/// Bytes of a data-less body kept for the error message.
const BODY_PREVIEW_LEN: usize = 200;

/// Connection and model settings for the Gemini API.
#[derive(Clone)]
pub struct GeminiSettings {
    /// API host, e.g. `https://generativelanguage.googleapis.com`.
    pub base_url: String,
    /// Model identifier, e.g. `gemini-1.5-flash`.
    pub model: String,
    /// API key sent as `x-goog-api-key`.
    pub api_key: Option<String>,
}

impl std::fmt::Debug for GeminiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiSettings")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
        }
    }
}

impl GeminiSettings {
    /// Build the streaming endpoint URL for the configured model.
    ///
    /// # Example
    ///
    /// ```rust
    /// use prebot::llm::GeminiSettings;
    ///
    /// let url = GeminiSettings::default().stream_url().unwrap();
    /// assert_eq!(
    ///     url.as_str(),
    ///     "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:streamGenerateContent?alt=sse"
    /// );
    /// ```
    pub fn stream_url(&self) -> Result<Url, url::ParseError> {
        let base = self.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!(
            "{base}/v1beta/models/{}:streamGenerateContent",
            self.model
        ))?;
        url.query_pairs_mut().append_pair("alt", "sse");
        Ok(url)
    }
}

/// Client for the Gemini streaming API.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    settings: Arc<GeminiSettings>,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("settings", &self.settings)
            .finish()
    }
}

impl GeminiClient {
    /// Create a new client with the given settings.
    #[must_use]
    pub fn new(settings: GeminiSettings) -> Self {
        Self::with_http(reqwest::Client::new(), settings)
    }

    /// Create a client that reuses an existing HTTP client.
    #[must_use]
    pub fn with_http(http: reqwest::Client, settings: GeminiSettings) -> Self {
        if settings.api_key.is_none() {
            tracing::warn!(
                name: "llm.config.missing_key",
                "No Gemini API key configured; every reply will fail"
            );
        }
        Self {
            http,
            settings: Arc::new(settings),
        }
    }

    /// Get the client settings.
    #[must_use]
    pub fn settings(&self) -> &GeminiSettings {
        &self.settings
    }
}

impl GenerativeChatClient for GeminiClient {
    fn start_session(&self, instruction_prompt: &str) -> Arc<dyn ChatHandle> {
        Arc::new(GeminiChat {
            http: self.http.clone(),
            settings: Arc::clone(&self.settings),
            history: ConversationHistory::seeded(instruction_prompt),
        })
    }
}

/// One Gemini conversation.
struct GeminiChat {
    http: reqwest::Client,
    settings: Arc<GeminiSettings>,
    history: ConversationHistory,
}

impl std::fmt::Debug for GeminiChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiChat")
            .field("model", &self.settings.model)
            .finish()
    }
}

#[async_trait::async_trait]
impl ChatHandle for GeminiChat {
    async fn send_streamed(&self, text: &str) -> Result<FragmentStream, LlmError> {
        let api_key = self
            .settings
            .api_key
            .clone()
            .ok_or(LlmError::MissingApiKey)?;
        let url = self.settings.stream_url()?;

        let mut contents = self.history.snapshot().await;
        contents.push(Turn::user(text));
        let body = request_body(&contents);

        tracing::debug!(
            model = %self.settings.model,
            turn_count = contents.len(),
            "Sending streamGenerateContent request"
        );

        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let byte_stream = resp.bytes_stream();
        let history = self.history.clone();
        let user_text = text.to_string();

        let out: FragmentStream = Box::pin(async_stream::try_stream! {
            let mut buf = Vec::<u8>::new();
            let mut reply = String::new();
            let mut head = Vec::<u8>::new();
            let mut saw_data = false;

            futures::pin_mut!(byte_stream);
            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk.map_err(LlmError::from)?;
                if head.len() < BODY_PREVIEW_LEN {
                    let take = chunk.len().min(BODY_PREVIEW_LEN - head.len());
                    head.extend_from_slice(&chunk[..take]);
                }
                buf.extend_from_slice(&chunk);

                while let Some((end, separator_len)) = find_frame_end(&buf) {
                    let frame = buf.drain(..end + separator_len).collect::<Vec<_>>();
                    saw_data |= has_data_line(&frame[..end]);
                    if let Some(fragment) = parse_frame(&frame[..end])? {
                        reply.push_str(&fragment);
                        yield fragment;
                    }
                }
            }

            // Last frame may arrive without a trailing blank line.
            saw_data |= has_data_line(&buf);
            if let Some(fragment) = parse_frame(&buf)? {
                reply.push_str(&fragment);
                yield fragment;
            }

            if !saw_data {
                let preview = String::from_utf8_lossy(&head).trim().to_string();
                Err::<(), _>(LlmError::NoData(preview))?;
            }

            history.record_exchange(user_text, reply).await;
        });

        Ok(out)
    }

    async fn history(&self) -> Vec<Turn> {
        self.history.snapshot().await
    }
}

/// Build the `streamGenerateContent` request body.
fn request_body(contents: &[Turn]) -> serde_json::Value {
    let contents: Vec<serde_json::Value> = contents
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Model => "model",
            };
            serde_json::json!({ "role": role, "parts": [{ "text": turn.text }] })
        })
        .collect();

    serde_json::json!({
        "contents": contents,
        "safetySettings": [
            { "category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_MEDIUM_AND_UP" },
            { "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_MEDIUM_AND_UP" },
        ],
    })
}

/// Find the end of the first SSE frame as `(frame_len, separator_len)`.
fn find_frame_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

/// Whether an SSE frame carries a `data:` field.
fn has_data_line(frame: &[u8]) -> bool {
    String::from_utf8_lossy(frame)
        .lines()
        .any(|line| line.trim_start().starts_with("data:"))
}

/// Decode one SSE frame into a text fragment.
///
/// Returns `Ok(None)` for frames without data or without text.
fn parse_frame(frame: &[u8]) -> Result<Option<String>, LlmError> {
    let text = String::from_utf8_lossy(frame);
    let data = text
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");

    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let response: GenerateContentResponse = serde_json::from_str(&data)?;

    if let Some(err) = response.error {
        let message = match err.status {
            Some(status) => format!("{status}: {}", err.message),
            None => err.message,
        };
        return Err(LlmError::Api(message));
    }

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(LlmError::Blocked(format!("prompt blocked ({reason})")));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Ok(None);
    };

    if let Some(reason) = candidate.finish_reason.as_deref()
        && BLOCKING_FINISH_REASONS.contains(&reason)
    {
        return Err(LlmError::Blocked(format!("reply stopped ({reason})")));
    }

    let fragment: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    Ok((!fragment.is_empty()).then_some(fragment))
}
