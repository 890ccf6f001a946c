//! Reconnecting realtime session.
//!
//! One session per signed-in identity. Lifecycle:
//! Disconnected → Connecting → Connected → ReconnectPending → Connecting …
//! A close or transport error (never a missing pong) sends the session to
//! ReconnectPending; after a fixed delay it tries again. Sign-out closes the
//! connection and cancels the pending reconnect timer.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::types::MessageRecord;

/// Fixed delay before a reconnect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Interval between liveness pings. The pong reply is advisory only — its
/// absence does not trigger a reconnect.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub reconnect_delay: Duration,
    pub ping_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: RECONNECT_DELAY,
            ping_interval: PING_INTERVAL,
        }
    }
}

/// Realtime connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    ReconnectPending,
}

/// Events surfaced to the owner of the session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Connection ack — confirms which identity the channel is bound to.
    Connected { user_id: String },
    /// New message push.
    Message {
        conversation_id: String,
        message: MessageRecord,
    },
    /// The connection dropped; a reconnect is pending.
    ConnectionLost,
}

enum ExitReason {
    ConnectionLost,
    Shutdown,
}

pub struct RealtimeSession {
    state_rx: watch::Receiver<SessionState>,
    shutdown_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl RealtimeSession {
    /// Open the session for a signed-in identity. The returned receiver
    /// yields push events until shutdown.
    pub fn start(
        ws_url: String,
        token: String,
        config: SessionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_session(
            ws_url,
            token,
            config,
            state_tx,
            shutdown_rx,
            event_tx,
        ));

        (
            Self {
                state_rx,
                shutdown_tx,
                task,
            },
            event_rx,
        )
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Tear the session down: closes any open connection and cancels a
    /// pending reconnect timer so a signed-out session can never reconnect.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

async fn run_session(
    ws_url: String,
    token: String,
    config: SessionConfig,
    state_tx: watch::Sender<SessionState>,
    mut shutdown_rx: watch::Receiver<bool>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
) {
    let url = format!("{}?token={}", ws_url, token);

    loop {
        let _ = state_tx.send(SessionState::Connecting);

        let connected = tokio::select! {
            result = connect_async(url.as_str()) => result,
            _ = shutdown_rx.changed() => break,
        };

        match connected {
            Ok((stream, _)) => {
                let _ = state_tx.send(SessionState::Connected);
                tracing::info!("realtime connection established");

                match run_connected(stream, &event_tx, &mut shutdown_rx, config.ping_interval)
                    .await
                {
                    ExitReason::Shutdown => break,
                    ExitReason::ConnectionLost => {
                        tracing::warn!("realtime connection lost");
                        let _ = event_tx.send(SessionEvent::ConnectionLost);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "realtime connection attempt failed");
            }
        }

        // Fixed-delay reconnect; sign-out cancels the pending timer.
        let _ = state_tx.send(SessionState::ReconnectPending);
        tokio::select! {
            _ = sleep(config.reconnect_delay) => {}
            _ = shutdown_rx.changed() => break,
        }
    }

    let _ = state_tx.send(SessionState::Disconnected);
    tracing::debug!("realtime session stopped");
}

async fn run_connected(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    event_tx: &mpsc::UnboundedSender<SessionEvent>,
    shutdown_rx: &mut watch::Receiver<bool>,
    ping_interval: Duration,
) -> ExitReason {
    let (mut write, mut read) = stream.split();
    let mut ping = interval(ping_interval);
    // Skip the immediate first tick
    ping.tick().await;

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = parse_frame(text.as_str()) {
                        let _ = event_tx.send(event);
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(reason = ?frame, "server closed realtime connection");
                    return ExitReason::ConnectionLost;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "realtime receive error");
                    return ExitReason::ConnectionLost;
                }
                None => return ExitReason::ConnectionLost,
            },
            _ = ping.tick() => {
                if write
                    .send(Message::Text(r#"{"type":"ping"}"#.into()))
                    .await
                    .is_err()
                {
                    return ExitReason::ConnectionLost;
                }
            }
            _ = shutdown_rx.changed() => {
                let _ = write.send(Message::Close(None)).await;
                return ExitReason::Shutdown;
            }
        }
    }
}

/// Decode a server frame. Unrecognized frame types are ignored for forward
/// compatibility; malformed payloads are logged and dropped.
fn parse_frame(text: &str) -> Option<SessionEvent> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "discarding malformed server frame");
            return None;
        }
    };

    match value.get("type").and_then(|t| t.as_str()) {
        Some("connection") => {
            let user_id = value
                .get("userId")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            Some(SessionEvent::Connected { user_id })
        }
        Some("message") => {
            let conversation_id = value
                .get("conversationId")
                .and_then(|v| v.as_str())?
                .to_string();
            let message: MessageRecord =
                match serde_json::from_value(value.get("message")?.clone()) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!(error = %e, "discarding message frame with bad payload");
                        return None;
                    }
                };
            Some(SessionEvent::Message {
                conversation_id,
                message,
            })
        }
        Some("pong") => {
            tracing::trace!("pong received");
            None
        }
        Some(frame_type) => {
            tracing::debug!(frame_type, "ignoring unrecognized frame type");
            None
        }
        None => {
            tracing::warn!("discarding frame without a type field");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connection_ack() {
        let event =
            parse_frame(r#"{"type":"connection","status":"connected","userId":"u1"}"#).unwrap();
        match event {
            SessionEvent::Connected { user_id } => assert_eq!(user_id, "u1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn parses_message_push() {
        let event = parse_frame(
            r#"{"type":"message","conversationId":"c1","message":{
                "id":1,"conversation_id":"c1","sender_id":"u2",
                "sender_display_name":"Tina","sender_avatar_url":null,
                "content":"hello","content_type":"text","attachment_url":null,
                "created_at":1000}}"#,
        )
        .unwrap();
        match event {
            SessionEvent::Message {
                conversation_id,
                message,
            } => {
                assert_eq!(conversation_id, "c1");
                assert_eq!(message.content, "hello");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn ignores_pong_unknown_and_malformed_frames() {
        assert!(parse_frame(r#"{"type":"pong"}"#).is_none());
        assert!(parse_frame(r#"{"type":"typing"}"#).is_none());
        assert!(parse_frame("not json at all").is_none());
        assert!(parse_frame(r#"{"missing":"type"}"#).is_none());
    }
}
