use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{
        Html, IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post, put},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::AppState;
use crate::chat::{ChatSession, SessionSnapshot};
use crate::config::{AppConfig, LlmConfig, LlmProvider};
use crate::events::ChatEvent;
use crate::llm::{GeminiClient, GeminiSettings, GenerativeChatClient, ScriptedChatClient};
use crate::ui;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
const BODY_LIMIT: usize = 64 * 1024;

type ApiError = (StatusCode, String);

/// Build the chat client selected by `llm.provider`.
#[must_use]
pub fn build_client(config: &LlmConfig) -> Arc<dyn GenerativeChatClient> {
    match config.provider {
        LlmProvider::Gemini => Arc::new(GeminiClient::new(GeminiSettings::from(config))),
        LlmProvider::Scripted => Arc::new(ScriptedChatClient::new()),
    }
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    info!(
        name: "llm.config.loaded",
        provider = ?config.llm.provider,
        base_url = %config.llm.base_url,
        model = %config.llm.model,
        stream_timeout_secs = config.llm.stream_timeout_secs,
        "LLM configuration loaded"
    );

    let client = build_client(&config.llm);
    let state = AppState::new(Arc::clone(&config), client);

    state
        .sessions
        .spawn_sweeper(config.session.ttl(), config.session.sweep_interval());

    let app = build_router(state);

    let addr = config.server.address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let timeout = state.config.server.request_timeout();

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/sessions", post(api_create_session))
        .route(
            "/api/sessions/{id}",
            get(api_get_session).delete(api_delete_session),
        )
        .route("/api/sessions/{id}/draft", put(api_put_draft))
        .route("/api/sessions/{id}/prompt", put(api_put_prompt))
        .route("/api/sessions/{id}/messages", post(api_send_message))
        .route("/api/sessions/{id}/cancel", post(api_cancel))
        .route("/api/sessions/{id}/events", get(api_session_events))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                let Some(duration) = timeout else {
                    return next.run(req).await;
                };
                match tokio::time::timeout(duration, next.run(req)).await {
                    Ok(res) => res,
                    Err(_elapsed) => {
                        (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response()
                    }
                }
            },
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// HTML Page Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn index_handler() -> Html<String> {
    Html(ui::render_page())
}

async fn health_handler() -> &'static str {
    "ok"
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for session creation.
#[derive(Debug, Default, Deserialize)]
struct CreateSessionRequest {
    /// Overrides the default instruction prompt.
    #[serde(default)]
    instruction_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateSessionResponse {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct DraftRequest {
    text: String,
}

#[derive(Debug, Deserialize)]
struct PromptRequest {
    instruction_prompt: String,
}

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    message: String,
}

fn find_session(state: &AppState, id: &str) -> Result<ChatSession, ApiError> {
    state
        .sessions
        .get(id)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Session {id} not found")))
}

fn busy() -> ApiError {
    (
        StatusCode::CONFLICT,
        "A reply is still streaming for this session".to_string(),
    )
}

/// POST /api/sessions - Create a session.
async fn api_create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> (StatusCode, Json<CreateSessionResponse>) {
    let prompt = req.instruction_prompt.filter(|p| !p.trim().is_empty());
    let session = state.sessions.create(prompt);

    (
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id().to_string(),
        }),
    )
}

/// GET /api/sessions/:id - Session snapshot.
async fn api_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    Ok(Json(find_session(&state, &id)?.snapshot()))
}

/// DELETE /api/sessions/:id - Discard a session.
async fn api_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Session {id} not found")))
}

/// PUT /api/sessions/:id/draft - Replace the unsent input.
async fn api_put_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DraftRequest>,
) -> Result<StatusCode, ApiError> {
    find_session(&state, &id)?.set_draft(req.text);
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/sessions/:id/prompt - Restart the conversation with a new prompt.
async fn api_put_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PromptRequest>,
) -> Result<StatusCode, ApiError> {
    let session = find_session(&state, &id)?;
    if req.instruction_prompt.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "instruction_prompt must not be empty".to_string(),
        ));
    }

    let _permit = session.try_acquire_send().ok_or_else(busy)?;
    session.set_instruction_prompt(req.instruction_prompt);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sessions/:id/messages - Send a message.
///
/// Returns once both messages are in the transcript; the reply streams in
/// the background and reaches the view through the event stream.
async fn api_send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Response, ApiError> {
    let session = find_session(&state, &id)?;
    let permit = session.try_acquire_send().ok_or_else(busy)?;

    let Some(pending) = session.begin_send(&req.message) else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let receipt = pending.receipt();
    tokio::spawn(pending.hold(permit).run());

    Ok((StatusCode::ACCEPTED, Json(receipt)).into_response())
}

/// POST /api/sessions/:id/cancel - Cancel the streaming reply.
async fn api_cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    find_session(&state, &id)?.cancel();
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/sessions/:id/events - SSE stream of session events.
async fn api_session_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session = find_session(&state, &id)?;
    let (snapshot, rx) = session.subscribe();

    tracing::debug!(session_id = %id, "Event subscriber attached");

    let stream = session_events(session, snapshot, rx).map(|event| {
        Ok::<_, Infallible>(Event::default().event(event.name()).data(event.to_json()))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

/// Snapshot first, then live events until the session closes.
///
/// A subscriber that falls behind gets a fresh snapshot instead of the
/// events it missed.
fn session_events(
    session: ChatSession,
    snapshot: ChatEvent,
    rx: broadcast::Receiver<ChatEvent>,
) -> impl Stream<Item = ChatEvent> + Send {
    async_stream::stream! {
        yield snapshot;

        let mut events = BroadcastStream::new(rx);
        loop {
            let item = tokio::select! {
                () = session.closed() => break,
                item = events.next() => item,
            };

            match item {
                Some(Ok(event)) => yield event,
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(
                        session_id = %session.id(),
                        skipped,
                        "Event subscriber lagged; resending snapshot"
                    );
                    yield session.snapshot_event();
                }
                None => break,
            }
        }
    }
}
