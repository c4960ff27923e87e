//! End-to-end tests driving the full router, in-process and over a socket.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_test::assert_ok;
use tokio_tungstenite::tungstenite::{self, Message};
use tower::ServiceExt;

use support_chat_gateway::app_state::AppState;
use support_chat_gateway::build_app;
use support_chat_gateway::config::{ChatConfig, normalize_media_url};
use support_chat_gateway::domain::{ChatId, FileUpload, NewMessage, Principal};
use support_chat_gateway::persistence::ChatStore;
use support_chat_gateway::service::IncomingMessage;

const ADMIN_TOKEN: &str = "admin-secret";
const USER_TOKEN: &str = "user-7-token";
const OTHER_USER_TOKEN: &str = "user-8-token";
const USER_ID: i64 = 7;

struct Fixture {
    app: Router,
    store: ChatStore,
    chat_id: ChatId,
}

async fn fixture() -> Fixture {
    let mut config = ChatConfig::in_memory();
    config.admin_api_token = Some(ADMIN_TOKEN.to_string());
    config.auto_reply_text = "We will answer shortly.".to_string();

    let store = ChatStore::memory();
    store.insert_user_token(USER_TOKEN, USER_ID).await.expect("user token");
    store.insert_user_token(OTHER_USER_TOKEN, 8).await.expect("other token");
    let chat = store.get_or_create_chat(USER_ID).await.expect("chat");

    let app = build_app(AppState::new(config, store.clone()));
    Fixture {
        app,
        store,
        chat_id: chat.id,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("infallible");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request")
}

fn post_json(uri: &str, token: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn history_requires_credentials() {
    let fx = fixture().await;
    let uri = format!("/api/support/chat_in_admin/{}/?messages=true", fx.chat_id);

    let (status, body) = send(&fx.app, get(&uri, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], 1501);

    let (status, _) = send(&fx.app, get(&uri, Some("nope"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn users_cannot_open_admin_endpoints() {
    let fx = fixture().await;
    let uri = format!("/api/support/chat_in_admin/{}/?messages=true", fx.chat_id);

    let (status, _) = send(&fx.app, get(&uri, Some(USER_TOKEN))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&fx.app, get("/api/support/chats/", Some(USER_TOKEN))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn history_lists_messages_in_creation_order() {
    let fx = fixture().await;
    for (text, from_user) in [("first", true), ("second", false), ("third", true)] {
        assert_ok!(
            fx.store
                .insert_message(NewMessage {
                    chat_id: fx.chat_id,
                    message_text: text.to_string(),
                    from_user,
                    file: None,
                })
                .await
        );
    }

    let uri = format!("/api/support/chat_in_admin/{}/?messages=true", fx.chat_id);
    let (status, body) = send(&fx.app, get(&uri, Some(ADMIN_TOKEN))).await;
    assert_eq!(status, StatusCode::OK);

    let Value::Array(messages) = body else {
        panic!("expected an array, got {body}");
    };
    let texts: Vec<&str> = messages
        .iter()
        .filter_map(|m| m["message_text"].as_str())
        .collect();
    assert_eq!(texts, ["first", "second", "third"]);
    assert_eq!(messages[1]["from_user"], false);
    assert!(messages[0]["file"].is_null());
    assert!(messages[0]["created_at"].is_string());
}

#[tokio::test]
async fn history_of_unknown_chat_is_not_found() {
    let fx = fixture().await;
    let (status, body) = send(
        &fx.app,
        get("/api/support/chat_in_admin/999/?messages=true", Some(ADMIN_TOKEN)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], 2001);
}

#[tokio::test]
async fn admin_page_embeds_the_chat_widget() {
    let fx = fixture().await;
    let uri = format!("/api/support/chat_in_admin/{}/", fx.chat_id);
    let response = fx
        .app
        .clone()
        .oneshot(get(&uri, Some(ADMIN_TOKEN)))
        .await
        .expect("infallible");
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let page = String::from_utf8_lossy(&bytes);
    assert!(page.contains(&format!("data-chat-id=\"{}\"", fx.chat_id)));
    assert!(page.contains("Technical support"));
}

#[tokio::test]
async fn admin_reply_requires_text_and_is_stored() {
    let fx = fixture().await;
    let uri = format!("/api/support/chat_in_admin/{}/", fx.chat_id);

    let (status, body) = send(&fx.app, post_json(&uri, ADMIN_TOKEN, &json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["error"]["message"]
            .as_str()
            .is_some_and(|m| m.contains("Message text is required"))
    );

    let (status, body) = send(
        &fx.app,
        post_json(&uri, ADMIN_TOKEN, &json!({"message_text": "How can we help?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Message sent");

    let messages = fx.store.list_messages(fx.chat_id).await.expect("messages");
    assert_eq!(messages.len(), 1);
    assert!(!messages[0].from_user);
    assert_eq!(body["message_id"], messages[0].id);
}

#[tokio::test]
async fn user_sees_only_their_own_chat() {
    let fx = fixture().await;

    let (status, body) = send(&fx.app, get("/api/support/chat/", Some(USER_TOKEN))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], fx.chat_id.get());

    let uri = format!("/api/support/chat/{}/", fx.chat_id);
    let (status, _) = send(&fx.app, get(&uri, Some(OTHER_USER_TOKEN))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_is_public() {
    let fx = fixture().await;
    let (status, body) = send(&fx.app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"], "memory");
}

#[tokio::test]
async fn stored_attachment_urls_are_served_for_every_media_url_form() {
    use base64::Engine;

    for raw in ["", "/", "media/", "/static/media/"] {
        let mut config = ChatConfig::in_memory();
        config.media_url = normalize_media_url(raw).expect("valid media url");
        config.media_root =
            std::env::temp_dir().join(format!("support-chat-media-{}", uuid::Uuid::new_v4()));
        let media_root = config.media_root.clone();

        let store = ChatStore::memory();
        let chat = store.get_or_create_chat(USER_ID).await.expect("chat");
        let state = AppState::new(config, store);
        let service = std::sync::Arc::clone(&state.chat_service);
        let app = build_app(state);

        let incoming = IncomingMessage {
            message_text: Some("screenshot".to_string()),
            file: Some(FileUpload {
                content: base64::engine::general_purpose::STANDARD.encode(b"png-bytes"),
                name: Some("shot.png".to_string()),
            }),
        };
        let message = service
            .receive(chat.id, Principal::User(USER_ID), incoming)
            .await
            .expect("message stored");
        let url = message.file.expect("attachment url");

        let response = app.clone().oneshot(get(&url, None)).await.expect("infallible");
        assert_eq!(response.status(), StatusCode::OK, "MEDIA_URL={raw:?} url={url}");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(&bytes[..], b"png-bytes");

        let _ = std::fs::remove_dir_all(media_root);
    }
}

// Real socket tests

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

async fn connect(addr: SocketAddr, chat_id: ChatId, token: &str) -> WsStream {
    let url = format!("ws://{addr}/ws/chat/{chat_id}/?token={token}");
    let (stream, _) = tokio_tungstenite::connect_async(url).await.expect("ws connect");
    stream
}

async fn next_json(stream: &mut WsStream) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("json frame");
        }
    }
}

#[tokio::test]
async fn ws_message_reaches_every_connection_of_the_chat() {
    let fx = fixture().await;
    let addr = serve(fx.app.clone()).await;

    let mut user = connect(addr, fx.chat_id, USER_TOKEN).await;
    let mut admin = connect(addr, fx.chat_id, ADMIN_TOKEN).await;

    user.send(Message::text(json!({"message_text": "My app crashes"}).to_string()))
        .await
        .expect("send");

    for stream in [&mut user, &mut admin] {
        let echo = next_json(stream).await;
        assert_eq!(echo["message_text"], "My app crashes");
        assert_eq!(echo["from_user"], true);

        let auto_reply = next_json(stream).await;
        assert_eq!(auto_reply["message_text"], "We will answer shortly.");
        assert_eq!(auto_reply["from_user"], false);
    }

    // The chat is marked active right after the frames are published.
    let mut chat = fx.store.require_chat(fx.chat_id).await.expect("chat");
    for _ in 0..50 {
        if chat.is_active {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        chat = fx.store.require_chat(fx.chat_id).await.expect("chat");
    }
    assert!(chat.is_active);
    assert_eq!(chat.title.as_deref(), Some("My app crashes"));

    admin
        .send(Message::text(json!({"message_text": "Which version?"}).to_string()))
        .await
        .expect("send");
    let answer = next_json(&mut user).await;
    assert_eq!(answer["message_text"], "Which version?");
    assert_eq!(answer["from_user"], false);

    let history: Value = reqwest::Client::new()
        .get(format!(
            "http://{addr}/api/support/chat_in_admin/{}/?messages=true",
            fx.chat_id
        ))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .expect("history request")
        .json()
        .await
        .expect("history json");
    assert_eq!(history.as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn ws_reports_invalid_frames_and_stays_open() {
    let fx = fixture().await;
    let addr = serve(fx.app.clone()).await;
    let mut user = connect(addr, fx.chat_id, USER_TOKEN).await;

    user.send(Message::text("not json")).await.expect("send");
    let reply = next_json(&mut user).await;
    assert!(reply["errors"]["non_field_errors"].is_array());

    user.send(Message::text(json!({"message_text": "   "}).to_string()))
        .await
        .expect("send");
    let reply = next_json(&mut user).await;
    assert_eq!(
        reply["errors"]["message_text"][0],
        "This field may not be blank."
    );

    user.send(Message::text(json!({"message_text": "still here"}).to_string()))
        .await
        .expect("send");
    let echo = next_json(&mut user).await;
    assert_eq!(echo["message_text"], "still here");
}

#[tokio::test]
async fn ws_upgrade_is_refused_without_access() {
    let fx = fixture().await;
    let addr = serve(fx.app.clone()).await;

    let cases = [
        (format!("ws://{addr}/ws/chat/{}/", fx.chat_id), StatusCode::UNAUTHORIZED),
        (
            format!("ws://{addr}/ws/chat/{}/?token={OTHER_USER_TOKEN}", fx.chat_id),
            StatusCode::FORBIDDEN,
        ),
        (
            format!("ws://{addr}/ws/chat/999/?token={ADMIN_TOKEN}"),
            StatusCode::NOT_FOUND,
        ),
    ];

    for (url, expected) in cases {
        match tokio_tungstenite::connect_async(url).await {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status().as_u16(), expected.as_u16());
            }
            Err(e) => panic!("expected HTTP {expected}, got {e}"),
            Ok(_) => panic!("upgrade unexpectedly accepted, expected HTTP {expected}"),
        }
    }
}
