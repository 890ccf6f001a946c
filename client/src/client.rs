//! High-level messaging client: one realtime session per signed-in identity
//! plus a conversation cache reconciled against push notifications.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::api::MessagingApi;
use crate::error::ClientError;
use crate::session::{RealtimeSession, SessionConfig, SessionEvent, SessionState};
use crate::types::{ConversationDetail, ConversationSummary, MessageRecord};

/// Page size used for cached conversation details.
const DETAIL_PAGE_SIZE: u32 = 50;

/// Lightweight notification surfaced when another participant's message
/// arrives over the realtime channel. The sender's own messages never
/// produce one.
#[derive(Debug, Clone)]
pub struct MessageNotification {
    pub conversation_id: String,
    pub message: MessageRecord,
}

type DetailCache = Arc<Mutex<HashMap<String, ConversationDetail>>>;

pub struct MessagingClient {
    api: MessagingApi,
    user_id: String,
    session: RealtimeSession,
    cache: DetailCache,
    pump: tokio::task::JoinHandle<()>,
}

impl MessagingClient {
    /// Sign in: wraps the request/response surface and opens the realtime
    /// session. Returns the client plus a channel of notifications for
    /// messages sent by other participants.
    pub fn sign_in(
        base_url: impl Into<String>,
        ws_url: impl Into<String>,
        user_id: impl Into<String>,
        token: impl Into<String>,
        config: SessionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<MessageNotification>) {
        let user_id = user_id.into();
        let token = token.into();
        let api = MessagingApi::new(base_url, token.clone());
        let (session, events) = RealtimeSession::start(ws_url.into(), token, config);

        let cache: DetailCache = Arc::new(Mutex::new(HashMap::new()));
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump_events(
            events,
            cache.clone(),
            user_id.clone(),
            notify_tx,
        ));

        (
            Self {
                api,
                user_id,
                session,
                cache,
                pump,
            },
            notify_rx,
        )
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Direct access to the request/response surface.
    pub fn api(&self) -> &MessagingApi {
        &self.api
    }

    /// Realtime connection state. Diagnostics only — polling stays
    /// authoritative while the channel is down.
    pub fn connection_state(&self) -> SessionState {
        self.session.state()
    }

    /// Conversation list. Always fetched fresh — ordering and unread counts
    /// change with every message.
    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>, ClientError> {
        self.api.conversations().await
    }

    /// Conversation detail, served from cache until a push marks it stale.
    /// Refetching replaces the cached page, so reconnects never duplicate
    /// messages.
    pub async fn conversation(
        &self,
        conversation_id: &str,
    ) -> Result<ConversationDetail, ClientError> {
        if let Some(cached) = self
            .cache
            .lock()
            .expect("cache lock")
            .get(conversation_id)
            .cloned()
        {
            return Ok(cached);
        }

        let detail = self
            .api
            .conversation(conversation_id, DETAIL_PAGE_SIZE, 0)
            .await?;
        self.cache
            .lock()
            .expect("cache lock")
            .insert(conversation_id.to_string(), detail.clone());
        Ok(detail)
    }

    /// Send a message. The local copy of the conversation is stale afterwards.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<MessageRecord, ClientError> {
        let message = self.api.send_message(conversation_id, content, None).await?;
        self.cache
            .lock()
            .expect("cache lock")
            .remove(conversation_id);
        Ok(message)
    }

    /// Sign out: closes the realtime connection and cancels any pending
    /// reconnect timer before dropping local state.
    pub async fn sign_out(self) {
        self.session.shutdown().await;
        self.pump.abort();
    }
}

async fn pump_events(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    cache: DetailCache,
    user_id: String,
    notify_tx: mpsc::UnboundedSender<MessageNotification>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Connected { user_id: bound } => {
                // Diagnostic confirmation only — no state change
                if bound == user_id {
                    tracing::debug!(user_id = %bound, "realtime channel identity confirmed");
                } else {
                    tracing::warn!(
                        bound = %bound,
                        expected = %user_id,
                        "realtime channel bound to unexpected identity"
                    );
                }
            }
            SessionEvent::Message {
                conversation_id,
                message,
            } => {
                // The cached copy no longer reflects the server; the next
                // read refetches.
                cache.lock().expect("cache lock").remove(&conversation_id);
                if message.sender_id != user_id {
                    let _ = notify_tx.send(MessageNotification {
                        conversation_id,
                        message,
                    });
                }
            }
            SessionEvent::ConnectionLost => {
                tracing::debug!("realtime connection lost; reconnect pending");
            }
        }
    }
}
