//! Wire mirrors of the server's response JSON.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRecord {
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

#[derive(Debug, Clone, Deserialize)]
pub struct MessagePreview {
    pub sender_id: String,
    pub sender_display_name: String,
    pub content: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantInfo {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub role: String,
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
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

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationDetail {
    pub conversation: ConversationSummary,
    pub messages: Vec<MessageRecord>,
    pub has_more: bool,
}
