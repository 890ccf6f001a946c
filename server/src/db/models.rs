/// Database row types for all tables.
/// These correspond 1:1 to the SQLite schema defined in migrations.rs.

/// User record in the users table.
/// `password_hash` is a credential field and is never selected into responses.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Booking record — the external booking surface the messaging core reads.
#[derive(Debug, Clone)]
pub struct Booking {
    pub id: String,
    pub tutor_id: String,
    pub student_id: String,
    pub scheduled_at: Option<i64>,
    pub created_at: i64,
}

/// Conversation record. booking_id links at most one conversation per booking.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    pub title: Option<String>,
    pub booking_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_message_at: Option<i64>,
}

/// Membership record in the conversation_participants table.
#[derive(Debug, Clone)]
pub struct Participant {
    pub conversation_id: String,
    pub user_id: String,
    pub role: String,
    pub active: bool,
    pub joined_at: i64,
    pub last_read_at: Option<i64>,
}

