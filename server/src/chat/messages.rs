//! REST endpoint for sending messages. Persistence commits before fan-out;
//! delivery is best-effort and never fails the request.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::auth::middleware::Claims;
use crate::chat::{fanout, store, store_error_status, MessageResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    pub content_type: Option<String>,
    pub attachment_url: Option<String>,
}

/// POST /api/conversations/{id}/messages
/// Send a message. The sender must be an active participant; the trimmed
/// content must be non-empty. Returns the created message enriched with the
/// sender's public profile fields.
pub async fn send_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(conversation_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), StatusCode> {
    let db = state.db.clone();
    let sender_id = claims.sub;
    let cid = conversation_id.clone();

    let message = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        store::insert_message(
            &conn,
            &cid,
            &sender_id,
            &body.content,
            body.content_type.as_deref().unwrap_or("text"),
            body.attachment_url.as_deref(),
        )
        .map_err(store_error_status)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    // Durably written — now push to live participants.
    fanout::fan_out(&state, &conversation_id, message.clone()).await;

    Ok((StatusCode::CREATED, Json(message)))
}
