//! Realtime frame types and dispatch.
//! Frames are JSON text with camelCase field names on the wire.

use axum::extract::ws::Message;
use serde::Serialize;

use crate::chat::MessageResponse;
use crate::ws::ConnectionSender;

/// Server → client frames.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Ack sent once after successful registration, confirming which
    /// identity the realtime channel is bound to.
    #[serde(rename_all = "camelCase")]
    Connection {
        status: &'static str,
        user_id: String,
    },
    /// New message push.
    #[serde(rename_all = "camelCase")]
    Message {
        conversation_id: String,
        message: MessageResponse,
    },
    /// Liveness reply to a client ping.
    Pong,
}

/// Handle an incoming text frame.
/// The only recognized application-level frame is the liveness ping; any
/// other frame type is accepted and ignored (forward-compatible no-op), and
/// malformed payloads are logged without closing the connection.
pub fn handle_text_frame(text: &str, tx: &ConnectionSender, user_id: &str) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "discarding malformed realtime frame");
            return;
        }
    };

    match value.get("type").and_then(|t| t.as_str()) {
        Some("ping") => send_frame(tx, &ServerFrame::Pong),
        Some(frame_type) => {
            tracing::debug!(user_id, frame_type, "ignoring unrecognized frame type");
        }
        None => {
            tracing::warn!(user_id, "discarding frame without a type field");
        }
    }
}

/// Encode a frame and queue it on a connection's channel.
pub fn send_frame(tx: &ConnectionSender, frame: &ServerFrame) {
    match serde_json::to_string(frame) {
        Ok(text) => {
            let _ = tx.send(Message::Text(text.into()));
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to encode realtime frame");
        }
    }
}
