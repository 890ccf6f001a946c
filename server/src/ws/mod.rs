pub mod actor;
pub mod handler;
pub mod protocol;

use axum::extract::ws::Message;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push frames to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// Connection registry: tracks all active WebSocket connections per user.
/// A user can have multiple concurrent connections (multiple devices/tabs).
/// Process-local only — rebuilt as clients reconnect after a restart.
pub type ConnectionRegistry = Arc<DashMap<String, Vec<ConnectionSender>>>;

/// Create a new empty connection registry.
pub fn new_connection_registry() -> ConnectionRegistry {
    Arc::new(DashMap::new())
}

/// Add a connection sender to a user's set, creating the entry if absent.
pub fn register(registry: &ConnectionRegistry, user_id: &str, tx: ConnectionSender) {
    registry.entry(user_id.to_string()).or_default().push(tx);

    let conn_count = registry.get(user_id).map(|v| v.len()).unwrap_or(0);
    tracing::debug!(user_id, connections = conn_count, "Connection registered");
}

/// Remove a connection sender from a user's set. Closed senders are swept in
/// the same pass, and the user's entry is dropped once empty so stale keys
/// never accumulate. Safe to call again for a connection already removed.
pub fn deregister(registry: &ConnectionRegistry, user_id: &str, tx: &ConnectionSender) {
    let mut remove_user = false;

    if let Some(mut connections) = registry.get_mut(user_id) {
        connections.retain(|sender| !sender.same_channel(tx) && !sender.is_closed());
        if connections.is_empty() {
            remove_user = true;
        }
    }

    if remove_user {
        registry.remove(user_id);
    }

    tracing::debug!(user_id, "Connection deregistered");
}

/// Snapshot of a user's current connection senders (possibly empty).
pub fn connections_for(registry: &ConnectionRegistry, user_id: &str) -> Vec<ConnectionSender> {
    registry
        .get(user_id)
        .map(|entry| entry.value().clone())
        .unwrap_or_default()
}

/// Queue a text frame on all of a user's live connections. Iterates a
/// snapshot so delivery never races connection churn. Returns the number of
/// connections the frame was queued for.
pub fn send_to_user(registry: &ConnectionRegistry, user_id: &str, frame: &str) -> usize {
    let senders = connections_for(registry, user_id);
    let mut queued = 0;
    for sender in &senders {
        if sender.send(Message::Text(frame.to_owned().into())).is_ok() {
            queued += 1;
        } else {
            tracing::debug!(user_id, "push to closed connection dropped");
        }
    }
    queued
}
