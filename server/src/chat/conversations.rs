//! REST endpoints for conversation management: listing, detail with history,
//! ad-hoc and direct creation, booking-linked resolution, and membership.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::auth::middleware::Claims;
use crate::chat::{store, store_error_status, ConversationDetail, ConversationSummary};
use crate::state::AppState;

/// Default page size for message history.
const DEFAULT_LIMIT: u32 = 50;
/// Maximum page size for message history.
const MAX_LIMIT: u32 = 100;

// --- Request types ---

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub title: Option<String>,
    pub participant_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DirectConversationRequest {
    pub other_user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AddParticipantRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// --- Handlers ---

/// GET /api/conversations
/// Active conversations for the caller, with participants, last-message
/// preview, and unread count.
pub async fn list_conversations(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<ConversationSummary>>, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub;

    let result = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        store::list_conversations(&conn, &user_id).map_err(store_error_status)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(result))
}

/// GET /api/conversations/{id}?limit={n}&offset={n}
/// Conversation detail with a paginated, ascending message page.
/// Side effect: opening the conversation moves the caller's read cursor.
pub async fn get_conversation(
    State(state): State<AppState>,
    claims: Claims,
    Path(conversation_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ConversationDetail>, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let result = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        store::conversation(&conn, &conversation_id).map_err(store_error_status)?;
        if !store::is_active_participant(&conn, &conversation_id, &user_id)
            .map_err(store_error_status)?
        {
            return Err(StatusCode::FORBIDDEN);
        }

        let (messages, has_more) =
            store::conversation_messages(&conn, &conversation_id, limit, offset)
                .map_err(store_error_status)?;
        store::mark_read(&conn, &conversation_id, &user_id).map_err(store_error_status)?;
        let conversation = store::conversation_summary(&conn, &conversation_id, &user_id)
            .map_err(store_error_status)?;

        Ok(ConversationDetail {
            conversation,
            messages,
            has_more,
        })
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(result))
}

/// POST /api/conversations
/// Create an ad-hoc conversation; the caller becomes the owner.
pub async fn create_conversation(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationSummary>), StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub;

    let result = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let conversation = store::create_conversation(
            &conn,
            &user_id,
            body.title.as_deref(),
            &body.participant_ids,
        )
        .map_err(store_error_status)?;
        store::conversation_summary(&conn, &conversation.id, &user_id).map_err(store_error_status)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok((StatusCode::CREATED, Json(result)))
}

/// POST /api/conversations/direct
/// Get or create the two-party conversation with another user.
/// Returns 201 when created, 200 when an existing conversation is reused.
pub async fn direct_conversation(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<DirectConversationRequest>,
) -> Result<(StatusCode, Json<ConversationSummary>), StatusCode> {
    if body.other_user_id == claims.sub {
        // A direct conversation needs two distinct parties
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.db.clone();
    let user_id = claims.sub;

    let (summary, created) = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let (conversation, created) =
            store::get_or_create_direct(&conn, &user_id, &body.other_user_id)
                .map_err(store_error_status)?;
        let summary = store::conversation_summary(&conn, &conversation.id, &user_id)
            .map_err(store_error_status)?;
        Ok::<_, StatusCode>((summary, created))
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(summary)))
}

/// GET /api/sessions/{booking_id}/conversation
/// Get-or-create-and-fetch the conversation linked to a booking. Only the
/// booking's two parties may open it. Returns 201 when created, 200 otherwise.
pub async fn booking_conversation(
    State(state): State<AppState>,
    claims: Claims,
    Path(booking_id): Path<String>,
) -> Result<(StatusCode, Json<ConversationDetail>), StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub;

    let (detail, created) = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let booking = store::booking(&conn, &booking_id).map_err(store_error_status)?;
        if user_id != booking.tutor_id && user_id != booking.student_id {
            return Err(StatusCode::FORBIDDEN);
        }

        let (conversation, created) =
            store::get_or_create_booking_conversation(&conn, &booking_id)
                .map_err(store_error_status)?;
        let (messages, has_more) =
            store::conversation_messages(&conn, &conversation.id, DEFAULT_LIMIT, 0)
                .map_err(store_error_status)?;
        store::mark_read(&conn, &conversation.id, &user_id).map_err(store_error_status)?;
        let summary = store::conversation_summary(&conn, &conversation.id, &user_id)
            .map_err(store_error_status)?;

        Ok::<_, StatusCode>((
            ConversationDetail {
                conversation: summary,
                messages,
                has_more,
            },
            created,
        ))
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(detail)))
}

/// POST /api/conversations/{id}/participants
/// Add a user to the conversation (or reactivate an earlier membership).
pub async fn add_participant(
    State(state): State<AppState>,
    claims: Claims,
    Path(conversation_id): Path<String>,
    Json(body): Json<AddParticipantRequest>,
) -> Result<StatusCode, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub;

    tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        store::add_participant(&conn, &conversation_id, &user_id, &body.user_id)
            .map_err(store_error_status)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(StatusCode::OK)
}

/// POST /api/conversations/{id}/leave
/// Deactivate the caller's membership. History stays; realtime delivery
/// stops until the user is re-added.
pub async fn leave_conversation(
    State(state): State<AppState>,
    claims: Claims,
    Path(conversation_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub;

    tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        store::deactivate_participant(&conn, &conversation_id, &user_id)
            .map_err(store_error_status)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(StatusCode::OK)
}
