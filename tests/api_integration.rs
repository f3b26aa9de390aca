use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use futures::StreamExt;
use prebot::AppState;
use prebot::chat::{CANCELLED_NOTICE, ERROR_NOTICE};
use prebot::config::{
    AppConfig, LlmConfig, LlmProvider, LogConfig, LogFormat, ServerConfig, SessionConfig,
};
use prebot::llm::{ScriptedChatClient, ScriptedReply};
use prebot::server::build_router;
use serde_json::{Value, json};

fn test_config() -> Arc<AppConfig> {
    Arc::new(AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            request_timeout_secs: 30,
        },
        llm: LlmConfig {
            provider: LlmProvider::Scripted,
            base_url: "http://127.0.0.1".to_string(),
            model: "scripted".to_string(),
            api_key: None,
            stream_timeout_secs: 5,
        },
        session: SessionConfig {
            ttl_secs: 1800,
            sweep_interval_secs: 60,
        },
        log: LogConfig {
            format: LogFormat::Pretty,
        },
    })
}

fn setup() -> (TestServer, ScriptedChatClient) {
    let client = ScriptedChatClient::new();
    let state = AppState::new(test_config(), Arc::new(client.clone()));
    let server = TestServer::new(build_router(state)).expect("Failed to start test server");
    (server, client)
}

async fn create_session(server: &TestServer) -> String {
    let response = server.post("/api/sessions").json(&json!({})).await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["session_id"]
        .as_str()
        .expect("session_id")
        .to_string()
}

/// Poll the snapshot until the reply has resolved.
async fn wait_until_idle(server: &TestServer, id: &str) -> Value {
    for _ in 0..200 {
        let snapshot = server.get(&format!("/api/sessions/{id}")).await.json::<Value>();
        if snapshot["is_typing"] == false {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session {id} never stopped typing");
}

#[tokio::test]
async fn test_index_page() {
    let (server, _) = setup();

    let response = server.get("/").await;
    response.assert_status_ok();
    let html = response.text();
    assert!(html.contains("AI counselor"));
    assert!(html.contains("Predict my rank"));
    assert!(html.contains("BOOK A CALL"));
}

#[tokio::test]
async fn test_health() {
    let (server, _) = setup();
    server.get("/health").await.assert_text("ok");
}

#[tokio::test]
async fn test_send_message_round_trip() {
    let (server, client) = setup();
    client.push_reply(ScriptedReply::fragments(["Sure, ", "let's start."]));
    let id = create_session(&server).await;

    let response = server
        .post(&format!("/api/sessions/{id}/messages"))
        .json(&json!({ "message": "Predict my rank" }))
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    let receipt = response.json::<Value>();

    let snapshot = wait_until_idle(&server, &id).await;
    let messages = snapshot["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["sender"], "user");
    assert_eq!(messages[0]["text"], "Predict my rank");
    assert_eq!(messages[0]["id"], receipt["user_message_id"]);
    assert_eq!(messages[1]["sender"], "bot");
    assert_eq!(messages[1]["text"], "Sure, let's start.");
    assert_eq!(messages[1]["id"], receipt["bot_message_id"]);
    assert_eq!(client.sent(), vec!["Predict my rank"]);
}

#[tokio::test]
async fn test_blank_message_is_ignored() {
    let (server, client) = setup();
    let id = create_session(&server).await;

    server
        .post(&format!("/api/sessions/{id}/messages"))
        .json(&json!({ "message": "   " }))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let snapshot = server.get(&format!("/api/sessions/{id}")).await.json::<Value>();
    assert_eq!(snapshot["messages"], json!([]));
    assert!(client.sent().is_empty());
}

#[tokio::test]
async fn test_send_while_typing_conflicts_then_cancel() {
    let (server, client) = setup();
    client.push_reply(ScriptedReply::fragments(["Thinking"]).then_hang());
    let id = create_session(&server).await;

    server
        .post(&format!("/api/sessions/{id}/messages"))
        .json(&json!({ "message": "first" }))
        .await
        .assert_status(StatusCode::ACCEPTED);

    server
        .post(&format!("/api/sessions/{id}/messages"))
        .json(&json!({ "message": "second" }))
        .await
        .assert_status(StatusCode::CONFLICT);

    server
        .put(&format!("/api/sessions/{id}/prompt"))
        .json(&json!({ "instruction_prompt": "Be brief." }))
        .await
        .assert_status(StatusCode::CONFLICT);

    for _ in 0..200 {
        let snapshot = server.get(&format!("/api/sessions/{id}")).await.json::<Value>();
        if snapshot["messages"][1]["text"] == "Thinking" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    server
        .post(&format!("/api/sessions/{id}/cancel"))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let snapshot = wait_until_idle(&server, &id).await;
    let messages = snapshot["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["text"], "Thinking");

    // The gate is released once the cancelled send settles.
    let mut accepted = false;
    for _ in 0..100 {
        let status = server
            .post(&format!("/api/sessions/{id}/messages"))
            .json(&json!({ "message": "again" }))
            .await
            .status_code();
        if status == StatusCode::ACCEPTED {
            accepted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(accepted);
}

#[tokio::test]
async fn test_cancel_before_first_fragment() {
    let (server, client) = setup();
    client.push_reply(ScriptedReply::fragments(["late"]).with_delay(Duration::from_secs(3)));
    let id = create_session(&server).await;

    server
        .post(&format!("/api/sessions/{id}/messages"))
        .json(&json!({ "message": "Hi" }))
        .await
        .assert_status(StatusCode::ACCEPTED);
    server
        .post(&format!("/api/sessions/{id}/cancel"))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let snapshot = wait_until_idle(&server, &id).await;
    assert_eq!(snapshot["messages"][1]["text"], CANCELLED_NOTICE);
}

#[tokio::test]
async fn test_stream_failure_writes_notice() {
    let (server, client) = setup();
    client.push_reply(ScriptedReply::rejected("quota exceeded"));
    let id = create_session(&server).await;

    server
        .post(&format!("/api/sessions/{id}/messages"))
        .json(&json!({ "message": "College info" }))
        .await
        .assert_status(StatusCode::ACCEPTED);

    let snapshot = wait_until_idle(&server, &id).await;
    assert_eq!(snapshot["messages"][1]["text"], ERROR_NOTICE);
}

#[tokio::test]
async fn test_draft_and_prompt() {
    let (server, client) = setup();
    let id = create_session(&server).await;

    server
        .put(&format!("/api/sessions/{id}/draft"))
        .json(&json!({ "text": "Know about" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let snapshot = server.get(&format!("/api/sessions/{id}")).await.json::<Value>();
    assert_eq!(snapshot["draft"], "Know about");

    server
        .put(&format!("/api/sessions/{id}/prompt"))
        .json(&json!({ "instruction_prompt": "Only discuss IIT Madras." }))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    assert_eq!(client.prompts().last().unwrap(), "Only discuss IIT Madras.");

    server
        .put(&format!("/api/sessions/{id}/prompt"))
        .json(&json!({ "instruction_prompt": "  " }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_with_custom_prompt() {
    let (server, client) = setup();

    server
        .post("/api/sessions")
        .json(&json!({ "instruction_prompt": "Answer in Hindi." }))
        .await
        .assert_status(StatusCode::CREATED);

    assert_eq!(client.prompts(), vec!["Answer in Hindi."]);
}

#[tokio::test]
async fn test_unknown_session() {
    let (server, _) = setup();

    server.get("/api/sessions/nope").await.assert_status_not_found();
    server.delete("/api/sessions/nope").await.assert_status_not_found();
    server.post("/api/sessions/nope/cancel").await.assert_status_not_found();
    server.get("/api/sessions/nope/events").await.assert_status_not_found();
    server
        .post("/api/sessions/nope/messages")
        .json(&json!({ "message": "Hi" }))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn test_delete_session() {
    let (server, _) = setup();
    let id = create_session(&server).await;

    server
        .delete(&format!("/api/sessions/{id}"))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .get(&format!("/api/sessions/{id}"))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn test_event_stream_over_http() {
    let client = ScriptedChatClient::new();
    client.push_reply(ScriptedReply::fragments(["Hel", "lo"]));
    let state = AppState::new(test_config(), Arc::new(client));
    let sessions = state.sessions.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let session = sessions.create(None);
    let http = reqwest::Client::new();
    let response = http
        .get(format!("http://{addr}/api/sessions/{}/events", session.id()))
        .send()
        .await
        .unwrap();
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let mut body = response.bytes_stream();
    let mut received = String::new();
    let mut sent = false;

    let read = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(chunk) = body.next().await {
            received.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
            if !sent && received.contains("snapshot") {
                sent = true;
                let session = session.clone();
                tokio::spawn(async move { session.send_message("Hi").await });
            }
            if received.contains(r#""is_typing":false}}"#) && received.contains("Hello") {
                break;
            }
        }
    })
    .await;
    assert!(read.is_ok(), "timed out; received so far:\n{received}");

    let names: Vec<&str> = received
        .lines()
        .filter_map(|line| line.strip_prefix("event:"))
        .map(str::trim)
        .collect();
    assert_eq!(
        names,
        vec![
            "snapshot",
            "message.appended",
            "typing",
            "message.appended",
            "message.updated",
            "message.updated",
            "typing",
        ]
    );
}
