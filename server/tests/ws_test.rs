//! Integration tests for the WebSocket relay: identify, presence, rooms and
//! call signaling over real sockets.

use futures_util::{SinkExt, StreamExt};
use relay_server::db::DbPool;
use relay_server::directory::SqliteStore;
use relay_server::push::LogPushSender;
use relay_server::state::{AppState, Collaborators, KeepAlive};
use relay_server::ws::protocol::ServerEvent;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Helper: start the server on a random port with a seeded social graph.
/// u1 <-> u2 are friends, u3 is unrelated.
async fn start_test_server() -> (SocketAddr, AppState, DbPool) {
    start_test_server_with(KeepAlive::default()).await
}

async fn start_test_server_with(keepalive: KeepAlive) -> (SocketAddr, AppState, DbPool) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = relay_server::db::init_db(&data_dir).expect("Failed to init DB");
    {
        let conn = db.lock().unwrap();
        conn.execute_batch(
            "INSERT INTO users (id, user_code) VALUES ('u1', 'AAA111'), ('u2', 'BBB222'), ('u3', 'CCC333');
             INSERT INTO friends (user_id, friend_id, status) VALUES ('u1', 'u2', 'accepted');",
        )
        .unwrap();
    }

    let state = AppState::new(
        Collaborators::from_store(SqliteStore::new(db.clone()), Arc::new(LogPushSender)),
        keepalive,
        50,
    );

    let app = relay_server::routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    (addr, state, db)
}

async fn connect(addr: SocketAddr) -> WsStream {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("Failed to connect");
    ws
}

async fn send(ws: &mut WsStream, event: Value) {
    ws.send(Message::Text(event.to_string().into()))
        .await
        .expect("Failed to send");
}

async fn identify(ws: &mut WsStream, user_id: &str) {
    send(ws, json!({"event": "identify", "data": {"userId": user_id}})).await;
}

/// Next server event, skipping control frames.
async fn recv(ws: &mut WsStream) -> ServerEvent {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("Expected a server event within timeout")
            .expect("Stream ended")
            .expect("WebSocket error");
        match msg {
            Message::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("Valid server event")
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Unexpected frame: {:?}", other),
        }
    }
}

/// Assert nothing arrives for a short while.
async fn assert_silent(ws: &mut WsStream) {
    let result = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(result.is_err(), "Expected no message, got {:?}", result);
}

/// Wait until the registry reflects an identify/teardown done on another task.
async fn wait_for<F: Fn() -> bool>(check: F) {
    for _ in 0..50 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Condition not reached in time");
}

#[tokio::test]
async fn test_end_to_end_presence_and_call() {
    let (addr, state, _db) = start_test_server().await;

    let mut c1 = connect(addr).await;
    identify(&mut c1, "u1").await;
    wait_for(|| state.registry.is_online("u1")).await;

    let mut c2 = connect(addr).await;
    identify(&mut c2, "u2").await;

    assert_eq!(recv(&mut c1).await, ServerEvent::UserOnline { user_id: "u2".into() });
    assert_eq!(recv(&mut c2).await, ServerEvent::UserOnline { user_id: "u1".into() });

    send(
        &mut c1,
        json!({"event": "call-initiate", "data": {"target": "u2", "offer": {"sdp": "o"}, "callerName": "One", "kind": "video"}}),
    )
    .await;
    match recv(&mut c2).await {
        ServerEvent::CallIncoming { from, caller_name, offer, .. } => {
            assert_eq!(from, "u1");
            assert_eq!(caller_name, "One");
            assert_eq!(offer, json!({"sdp": "o"}));
        }
        other => panic!("Expected call-incoming, got {:?}", other),
    }

    send(&mut c2, json!({"event": "call-answer", "data": {"target": "u1", "answer": {"sdp": "a"}}})).await;
    assert_eq!(
        recv(&mut c1).await,
        ServerEvent::CallAnswered { answer: json!({"sdp": "a"}), from: "u2".into() }
    );

    send(&mut c2, json!({"event": "ice-candidate", "data": {"target": "u1", "candidate": {"c": 1}}})).await;
    assert_eq!(
        recv(&mut c1).await,
        ServerEvent::IceCandidate { candidate: json!({"c": 1}), from: "u2".into() }
    );

    send(&mut c1, json!({"event": "call-end", "data": {"target": "u2"}})).await;
    assert_eq!(recv(&mut c2).await, ServerEvent::CallEnded { from: "u1".into() });

    c1.close(None).await.expect("Failed to close");
    assert_eq!(recv(&mut c2).await, ServerEvent::UserOffline { user_id: "u1".into() });
    wait_for(|| !state.registry.is_online("u1")).await;
}

#[tokio::test]
async fn test_unrelated_user_sees_no_presence() {
    let (addr, state, _db) = start_test_server().await;

    let mut c3 = connect(addr).await;
    identify(&mut c3, "u3").await;
    wait_for(|| state.registry.is_online("u3")).await;

    let mut c1 = connect(addr).await;
    identify(&mut c1, "u1").await;
    wait_for(|| state.registry.is_online("u1")).await;

    assert_silent(&mut c3).await;
    assert_silent(&mut c1).await;
}

#[tokio::test]
async fn test_call_to_offline_user_reports_error_only_to_caller() {
    let (addr, state, _db) = start_test_server().await;

    let mut c1 = connect(addr).await;
    identify(&mut c1, "u1").await;
    let mut c3 = connect(addr).await;
    identify(&mut c3, "u3").await;
    wait_for(|| state.registry.online_count() == 2).await;

    send(&mut c1, json!({"event": "call-initiate", "data": {"target": "u2", "offer": null}})).await;
    assert_eq!(
        recv(&mut c1).await,
        ServerEvent::CallError { message: "User is offline".into() }
    );

    send(&mut c1, json!({"event": "call-initiate", "data": {"offer": null}})).await;
    assert_eq!(
        recv(&mut c1).await,
        ServerEvent::CallError { message: "Recipient ID required".into() }
    );

    // Other steps to an offline target are dropped without a reply
    send(&mut c1, json!({"event": "call-end", "data": {"target": "u2"}})).await;
    assert_silent(&mut c1).await;
    assert_silent(&mut c3).await;
}

#[tokio::test]
async fn test_spoofed_from_is_replaced_by_registry_identity() {
    let (addr, state, _db) = start_test_server().await;

    let mut c3 = connect(addr).await;
    identify(&mut c3, "u3").await;
    let mut c2 = connect(addr).await;
    identify(&mut c2, "u2").await;
    wait_for(|| state.registry.online_count() == 2).await;

    send(
        &mut c3,
        json!({"event": "call-initiate", "data": {"target": "u2", "offer": "o", "from": "u1"}}),
    )
    .await;

    match recv(&mut c2).await {
        ServerEvent::CallIncoming { from, .. } => assert_eq!(from, "u3"),
        other => panic!("Expected call-incoming, got {:?}", other),
    }
}

#[tokio::test]
async fn test_room_broadcast_includes_sender_devices() {
    let (addr, state, _db) = start_test_server().await;

    let mut members = Vec::new();
    for user in ["u1", "u2", "u3"] {
        let mut ws = connect(addr).await;
        identify(&mut ws, user).await;
        send(&mut ws, json!({"event": "join-room", "data": {"roomId": "conv-9"}})).await;
        members.push(ws);
    }
    wait_for(|| state.rooms.members("conv-9").len() == 3).await;

    // Drain presence between u1 and u2
    let _ = recv(&mut members[0]).await;
    let _ = recv(&mut members[1]).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/api/messages/deliver", addr))
        .json(&json!({
            "id": "m1",
            "conversationId": "conv-9",
            "senderId": "u1",
            "content": "hello room",
            "type": "text",
            "createdAt": "2024-05-01T10:00:00Z",
            "sender": {"id": "u1", "displayName": "One"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["delivered"], 3);

    for ws in members.iter_mut() {
        match recv(ws).await {
            ServerEvent::NewMessage(msg) => {
                assert_eq!(msg.id, "m1");
                assert_eq!(msg.content, "hello room");
                assert_eq!(msg.sender.display_name.as_deref(), Some("One"));
            }
            other => panic!("Expected new-message, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_invalid_frames_get_error_and_connection_survives() {
    let (addr, state, _db) = start_test_server().await;

    let mut ws = connect(addr).await;
    ws.send(Message::Text("{not json".into())).await.unwrap();
    assert_eq!(
        recv(&mut ws).await,
        ServerEvent::Error { code: 400, message: "Invalid event".into() }
    );

    identify(&mut ws, "u3").await;
    wait_for(|| state.registry.is_online("u3")).await;
}

#[tokio::test]
async fn test_ws_ping_pong() {
    let (addr, _state, _db) = start_test_server().await;
    let mut ws = connect(addr).await;

    ws.send(Message::Ping(vec![42, 43, 44].into()))
        .await
        .expect("Failed to send ping");

    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("Expected pong within timeout");

    match msg {
        Some(Ok(Message::Pong(data))) => {
            assert_eq!(data.as_ref(), &[42, 43, 44], "Pong data should match ping");
        }
        other => panic!("Expected Pong message, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_presence_endpoint_and_health() {
    let (addr, state, _db) = start_test_server().await;
    let client = reqwest::Client::new();

    let mut ws = connect(addr).await;
    identify(&mut ws, "u2").await;
    wait_for(|| state.registry.is_online("u2")).await;

    let body: Value = client
        .get(format!("http://{}/api/presence/u2", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"userId": "u2", "online": true}));

    let body: Value = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["online_users"], 1);
}

#[tokio::test]
async fn test_silent_peer_is_dropped_after_pong_timeout() {
    let (addr, state, _db) = start_test_server_with(KeepAlive {
        ping_interval: Duration::from_millis(200),
        pong_timeout: Duration::from_millis(200),
    })
    .await;

    // Never polled after identify, so it never answers pings
    let mut silent = connect(addr).await;
    identify(&mut silent, "u1").await;
    wait_for(|| state.registry.is_online("u1")).await;

    let mut friend = connect(addr).await;
    identify(&mut friend, "u2").await;
    assert_eq!(recv(&mut friend).await, ServerEvent::UserOnline { user_id: "u1".into() });

    // The reading friend keeps answering pings and sees u1 go away
    assert_eq!(recv(&mut friend).await, ServerEvent::UserOffline { user_id: "u1".into() });
    assert!(!state.registry.is_online("u1"));
    assert!(state.registry.is_online("u2"));

    drop(silent);
}
