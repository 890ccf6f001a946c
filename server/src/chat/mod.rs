pub mod conversations;
pub mod fanout;
pub mod messages;
pub mod store;

use axum::http::StatusCode;
use serde::Serialize;

use store::StoreError;

/// Message as returned by the REST surface and pushed over the realtime channel.
/// Carries the sender's public profile fields only — never credentials.
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub id: i64,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_display_name: String,
    pub sender_avatar_url: Option<String>,
    pub content: String,
    pub content_type: String,
    pub attachment_url: Option<String>,
    pub created_at: u64,
}

/// Latest-message preview shown in conversation lists.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePreview {
    pub sender_id: String,
    pub sender_display_name: String,
    pub content: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantInfo {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub role: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: Option<String>,
    pub booking_id: Option<String>,
    pub created_at: u64,
    pub last_message_at: Option<u64>,
    pub participants: Vec<ParticipantInfo>,
    pub last_message: Option<MessagePreview>,
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    pub conversation: ConversationSummary,
    pub messages: Vec<MessageResponse>,
    pub has_more: bool,
}

/// Map store failures onto the REST status taxonomy.
pub(crate) fn store_error_status(err: StoreError) -> StatusCode {
    match err {
        StoreError::NotFound => StatusCode::NOT_FOUND,
        StoreError::NotAParticipant => StatusCode::FORBIDDEN,
        StoreError::EmptyContent | StoreError::InvalidContentType => StatusCode::BAD_REQUEST,
        StoreError::ContentTooLong => StatusCode::PAYLOAD_TOO_LARGE,
        StoreError::Db(e) => {
            tracing::error!(error = %e, "database failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
