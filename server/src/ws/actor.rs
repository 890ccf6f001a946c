use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;
use crate::ws::protocol::{self, ServerFrame};
use crate::ws;

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader loop: dispatches incoming frames
///
/// The mpsc channel allows any part of the system (fan-out in particular) to
/// push frames to this client by cloning the sender. Per-frame errors never
/// tear down the connection; only close and transport errors do.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: String) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    // Register this connection in the connection registry
    ws::register(&state.connections, &user_id, tx.clone());

    // Confirm which identity the realtime channel is bound to
    protocol::send_frame(
        &tx,
        &ServerFrame::Connection {
            status: "connected",
            user_id: user_id.clone(),
        },
    );

    tracing::info!(user_id = %user_id, "WebSocket actor started");

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Reader loop: process incoming WebSocket messages
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_frame(text.as_str(), &tx, &user_id);
                }
                Message::Ping(data) => {
                    // Respond to transport-level pings with pongs
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Pong(_) => {
                    // Advisory only — no enforced liveness timeout
                }
                Message::Binary(_) => {
                    tracing::debug!(user_id = %user_id, "ignoring binary frame");
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = %user_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                // Stream ended — client disconnected
                tracing::info!(user_id = %user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: stop the writer and drop this connection from the registry
    writer_handle.abort();
    ws::deregister(&state.connections, &user_id, &tx);

    tracing::info!(user_id = %user_id, "WebSocket actor stopped");
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}
