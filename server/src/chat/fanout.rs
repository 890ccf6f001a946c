//! Best-effort delivery of freshly persisted messages to live recipients.

use crate::chat::{store, MessageResponse};
use crate::state::AppState;
use crate::ws::{self, protocol::ServerFrame};

/// Push a persisted message to every live connection of every active
/// participant, including the sender's own other connections. Participants
/// without live connections receive nothing and will see the message on
/// their next fetch. Fire-and-forget: no acknowledgement is awaited, and
/// delivery failures are logged without propagating.
///
/// Authorization is the caller's responsibility — the send-message operation
/// has already checked that the sender is an active participant.
pub async fn fan_out(state: &AppState, conversation_id: &str, message: MessageResponse) {
    let db = state.db.clone();
    let cid = conversation_id.to_string();

    let participants = tokio::task::spawn_blocking(move || {
        let conn = match db.lock() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "DB lock failed during fan-out");
                return Vec::new();
            }
        };
        match store::active_participant_ids(&conn, &cid) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(
                    conversation_id = %cid,
                    error = %e,
                    "participant lookup failed during fan-out"
                );
                Vec::new()
            }
        }
    })
    .await
    .unwrap_or_default();

    let frame = ServerFrame::Message {
        conversation_id: conversation_id.to_string(),
        message,
    };
    let text = match serde_json::to_string(&frame) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode message frame");
            return;
        }
    };

    let mut delivered = 0;
    for user_id in &participants {
        delivered += ws::send_to_user(&state.connections, user_id, &text);
    }

    tracing::debug!(
        conversation_id,
        participants = participants.len(),
        delivered,
        "message fan-out complete"
    );
}
