//! Shared helpers for integration tests: an in-process server on an
//! ephemeral port, direct DB seeding, token minting, and WebSocket plumbing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rusqlite::params;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use tutorlink_server::auth::jwt;
use tutorlink_server::db::{self, DbPool};
use tutorlink_server::routes;
use tutorlink_server::state::AppState;
use tutorlink_server::ws::{self, ConnectionRegistry};

pub type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TestServer {
    pub base_url: String,
    pub addr: SocketAddr,
    pub db: DbPool,
    pub jwt_secret: Vec<u8>,
    pub connections: ConnectionRegistry,
    _data_dir: tempfile::TempDir,
}

/// Start the server on a random port with a fresh database.
pub async fn start_test_server() -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret =
        jwt::load_or_generate_jwt_secret(&data_dir).expect("Failed to generate JWT secret");
    let connections = ws::new_connection_registry();

    let state = AppState {
        db: db.clone(),
        jwt_secret: jwt_secret.clone(),
        connections: connections.clone(),
    };

    let app = routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        addr,
        db,
        jwt_secret,
        connections,
        _data_dir: tmp_dir,
    }
}

/// Insert a user directly — registration flows live outside the messaging core.
pub fn seed_user(server: &TestServer, id: &str, display_name: &str) -> String {
    let conn = server.db.lock().unwrap();
    conn.execute(
        "INSERT INTO users (id, display_name, avatar_url, password_hash, created_at, updated_at)
         VALUES (?1, ?2, NULL, 'test-password-hash', 0, 0)",
        params![id, display_name],
    )
    .unwrap();
    id.to_string()
}

/// Insert a booking between a tutor and a student.
pub fn seed_booking(server: &TestServer, id: &str, tutor_id: &str, student_id: &str) -> String {
    let conn = server.db.lock().unwrap();
    conn.execute(
        "INSERT INTO bookings (id, tutor_id, student_id, scheduled_at, created_at)
         VALUES (?1, ?2, ?3, NULL, 0)",
        params![id, tutor_id, student_id],
    )
    .unwrap();
    id.to_string()
}

/// Mint a valid access token for a seeded user.
pub fn token_for(server: &TestServer, user_id: &str) -> String {
    jwt::issue_access_token(&server.jwt_secret, user_id).expect("issue token")
}

/// Open a WebSocket connection with the given token.
pub async fn ws_connect(server: &TestServer, token: &str) -> WsClient {
    let url = format!("ws://{}/ws?token={}", server.addr, token);
    let (stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("WebSocket connect");
    stream
}

/// Open a WebSocket connection and consume the connection ack frame.
pub async fn ws_connect_authed(server: &TestServer, token: &str) -> WsClient {
    let mut ws = ws_connect(server, token).await;
    let ack = recv_json(&mut ws).await;
    assert_eq!(ack["type"], "connection");
    assert_eq!(ack["status"], "connected");
    ws
}

/// Receive the next text frame as JSON, failing after a timeout.
pub async fn recv_json(ws: &mut WsClient) -> serde_json::Value {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended")
        .expect("WebSocket error");
    match msg {
        Message::Text(text) => serde_json::from_str(text.as_str()).expect("frame is not JSON"),
        other => panic!("expected text frame, got {:?}", other),
    }
}

/// Assert that no frame arrives within the window.
pub async fn expect_silence(ws: &mut WsClient, window: Duration) {
    let result = tokio::time::timeout(window, ws.next()).await;
    assert!(result.is_err(), "expected no frame, got {:?}", result);
}

/// Send a text frame.
pub async fn send_text(ws: &mut WsClient, text: &str) {
    ws.send(Message::Text(text.to_owned().into()))
        .await
        .expect("WebSocket send");
}
