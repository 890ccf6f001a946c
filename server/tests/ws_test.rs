//! Integration tests for the realtime gateway: authentication gate,
//! connection ack, keep-alive protocol, frame tolerance, and registry
//! cleanup on disconnect.

mod common;

use std::time::Duration;

use common::*;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

/// Wait until the registry holds (or no longer holds) a user, with a timeout.
async fn wait_for_registration(server: &TestServer, user_id: &str, present: bool) {
    for _ in 0..50 {
        if server.connections.contains_key(user_id) == present {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "registry never reached desired state for {} (present = {})",
        user_id, present
    );
}

#[tokio::test]
async fn upgrade_without_token_is_rejected_and_never_registered() {
    let server = start_test_server().await;

    let url = format!("ws://{}/ws", server.addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("upgrade should succeed before the close");

    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("expected close frame")
        .expect("stream ended")
        .expect("WebSocket error");
    match msg {
        Message::Close(Some(frame)) => {
            assert_eq!(u16::from(frame.code), 1008, "expected policy violation");
        }
        other => panic!("expected close frame, got {:?}", other),
    }

    assert!(server.connections.is_empty());
}

#[tokio::test]
async fn upgrade_with_invalid_token_is_rejected() {
    let server = start_test_server().await;

    let url = format!("ws://{}/ws?token=not-a-jwt", server.addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("expected close frame")
        .expect("stream ended")
        .expect("WebSocket error");
    assert!(msg.is_close(), "expected close, got {:?}", msg);
    assert!(server.connections.is_empty());
}

#[tokio::test]
async fn ack_frame_confirms_bound_identity() {
    let server = start_test_server().await;
    seed_user(&server, "alice", "Alice");
    let token = token_for(&server, "alice");

    let mut ws = ws_connect(&server, &token).await;
    let ack = recv_json(&mut ws).await;
    assert_eq!(ack["type"], "connection");
    assert_eq!(ack["status"], "connected");
    assert_eq!(ack["userId"], "alice");
}

#[tokio::test]
async fn json_ping_receives_pong() {
    let server = start_test_server().await;
    seed_user(&server, "alice", "Alice");
    let token = token_for(&server, "alice");

    let mut ws = ws_connect_authed(&server, &token).await;
    send_text(&mut ws, r#"{"type":"ping"}"#).await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "pong");
}

#[tokio::test]
async fn transport_ping_receives_pong() {
    let server = start_test_server().await;
    seed_user(&server, "alice", "Alice");
    let token = token_for(&server, "alice");

    let mut ws = ws_connect_authed(&server, &token).await;
    ws.send(Message::Ping(vec![42, 43, 44].into())).await.unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("expected pong")
        .expect("stream ended")
        .expect("WebSocket error");
    match msg {
        Message::Pong(data) => assert_eq!(data.as_ref(), &[42, 43, 44]),
        other => panic!("expected pong, got {:?}", other),
    }
}

#[tokio::test]
async fn malformed_and_unknown_frames_leave_the_connection_open() {
    let server = start_test_server().await;
    seed_user(&server, "alice", "Alice");
    let token = token_for(&server, "alice");

    let mut ws = ws_connect_authed(&server, &token).await;

    // Invalid JSON, a frame without a type, and an unknown type
    send_text(&mut ws, "this is not json {{{").await;
    send_text(&mut ws, r#"{"no_type":true}"#).await;
    send_text(&mut ws, r#"{"type":"typing","conversationId":"c1"}"#).await;
    expect_silence(&mut ws, Duration::from_millis(300)).await;

    // Connection still works: a valid ping gets its pong
    send_text(&mut ws, r#"{"type":"ping"}"#).await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "pong");
}

#[tokio::test]
async fn disconnect_cleans_up_the_registry() {
    let server = start_test_server().await;
    seed_user(&server, "alice", "Alice");
    let token = token_for(&server, "alice");

    let mut ws = ws_connect_authed(&server, &token).await;
    wait_for_registration(&server, "alice", true).await;

    ws.send(Message::Close(None)).await.unwrap();
    drop(ws);

    // The user's entry is removed entirely, not left as an empty set
    wait_for_registration(&server, "alice", false).await;

    // Reconnecting works fine after cleanup
    let _ws = ws_connect_authed(&server, &token).await;
    wait_for_registration(&server, "alice", true).await;
}

#[tokio::test]
async fn second_tab_survives_first_tab_closing() {
    let server = start_test_server().await;
    seed_user(&server, "alice", "Alice");
    let token = token_for(&server, "alice");

    let mut tab1 = ws_connect_authed(&server, &token).await;
    let mut tab2 = ws_connect_authed(&server, &token).await;
    wait_for_registration(&server, "alice", true).await;

    tab1.send(Message::Close(None)).await.unwrap();
    drop(tab1);

    // Give the server a moment to deregister tab1
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.connections.contains_key("alice"));

    // tab2 still answers pings
    send_text(&mut tab2, r#"{"type":"ping"}"#).await;
    let reply = recv_json(&mut tab2).await;
    assert_eq!(reply["type"], "pong");
}
