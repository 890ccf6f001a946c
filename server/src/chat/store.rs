//! Conversation, participant, and message store operations.
//!
//! All functions are synchronous over a borrowed rusqlite connection;
//! handlers call them from tokio::task::spawn_blocking with the DbPool lock
//! held for the duration of one logical operation.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::models::{Booking, Conversation, Participant, User};

use super::{ConversationSummary, MessagePreview, MessageResponse, ParticipantInfo};

/// Maximum message content length (chars).
pub const MAX_CONTENT_LENGTH: usize = 4000;

/// Content-type tags accepted for new messages.
const CONTENT_TYPES: [&str; 3] = ["text", "image", "file"];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("caller is not an active participant")]
    NotAParticipant,
    #[error("message content is empty")]
    EmptyContent,
    #[error("message content exceeds {MAX_CONTENT_LENGTH} bytes")]
    ContentTooLong,
    #[error("unsupported content type")]
    InvalidContentType,
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn conversation_from_row(row: &Row) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        title: row.get(1)?,
        booking_id: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        last_message_at: row.get(5)?,
    })
}

fn message_from_row(row: &Row) -> rusqlite::Result<MessageResponse> {
    Ok(MessageResponse {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_display_name: row.get(3)?,
        sender_avatar_url: row.get(4)?,
        content: row.get(5)?,
        content_type: row.get(6)?,
        attachment_url: row.get(7)?,
        created_at: row.get::<_, i64>(8)? as u64,
    })
}

// --- Users and bookings (external surfaces the core reads) ---

/// Public profile fields for a user. Never selects credential columns.
pub fn user_profile(conn: &Connection, user_id: &str) -> StoreResult<User> {
    conn.query_row(
        "SELECT id, display_name, avatar_url, created_at, updated_at FROM users WHERE id = ?1",
        params![user_id],
        |row| {
            Ok(User {
                id: row.get(0)?,
                display_name: row.get(1)?,
                avatar_url: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        },
    )
    .optional()?
    .ok_or(StoreError::NotFound)
}

pub fn booking(conn: &Connection, booking_id: &str) -> StoreResult<Booking> {
    conn.query_row(
        "SELECT id, tutor_id, student_id, scheduled_at, created_at FROM bookings WHERE id = ?1",
        params![booking_id],
        |row| {
            Ok(Booking {
                id: row.get(0)?,
                tutor_id: row.get(1)?,
                student_id: row.get(2)?,
                scheduled_at: row.get(3)?,
                created_at: row.get(4)?,
            })
        },
    )
    .optional()?
    .ok_or(StoreError::NotFound)
}

// --- Conversations ---

pub fn conversation(conn: &Connection, conversation_id: &str) -> StoreResult<Conversation> {
    conn.query_row(
        "SELECT id, title, booking_id, created_at, updated_at, last_message_at
         FROM conversations WHERE id = ?1",
        params![conversation_id],
        conversation_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound)
}

fn conversation_for_booking(
    conn: &Connection,
    booking_id: &str,
) -> StoreResult<Option<Conversation>> {
    Ok(conn
        .query_row(
            "SELECT id, title, booking_id, created_at, updated_at, last_message_at
             FROM conversations WHERE booking_id = ?1",
            params![booking_id],
            conversation_from_row,
        )
        .optional()?)
}

fn insert_participant(
    conn: &Connection,
    conversation_id: &str,
    user_id: &str,
    role: &str,
    now: i64,
) -> StoreResult<()> {
    // Membership is unique per (conversation, user); re-adding reactivates.
    conn.execute(
        "INSERT INTO conversation_participants (conversation_id, user_id, role, active, joined_at)
         VALUES (?1, ?2, ?3, 1, ?4)
         ON CONFLICT(conversation_id, user_id) DO UPDATE SET active = 1",
        params![conversation_id, user_id, role, now],
    )?;
    Ok(())
}

/// Create an ad-hoc conversation. The creator becomes the owner; every id in
/// `participant_ids` joins as an active member. Unknown users fail the whole
/// operation.
pub fn create_conversation(
    conn: &Connection,
    creator_id: &str,
    title: Option<&str>,
    participant_ids: &[String],
) -> StoreResult<Conversation> {
    user_profile(conn, creator_id)?;
    for user_id in participant_ids {
        user_profile(conn, user_id)?;
    }

    let now = now_millis();
    let conversation_id = Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO conversations (id, title, booking_id, created_at, updated_at)
         VALUES (?1, ?2, NULL, ?3, ?3)",
        params![conversation_id, title, now],
    )?;

    insert_participant(conn, &conversation_id, creator_id, "owner", now)?;
    for user_id in participant_ids {
        if user_id != creator_id {
            insert_participant(conn, &conversation_id, user_id, "member", now)?;
        }
    }

    conversation(conn, &conversation_id)
}

/// Get or create the two-party ad-hoc conversation between caller and other.
/// Returns (conversation, created).
pub fn get_or_create_direct(
    conn: &Connection,
    caller_id: &str,
    other_id: &str,
) -> StoreResult<(Conversation, bool)> {
    user_profile(conn, other_id)?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT c.id FROM conversations c
             JOIN conversation_participants pa ON pa.conversation_id = c.id AND pa.user_id = ?1
             JOIN conversation_participants pb ON pb.conversation_id = c.id AND pb.user_id = ?2
             WHERE c.booking_id IS NULL
               AND (SELECT COUNT(*) FROM conversation_participants p
                    WHERE p.conversation_id = c.id) = 2
             ORDER BY c.created_at ASC
             LIMIT 1",
            params![caller_id, other_id],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(conversation_id) = existing {
        return Ok((conversation(conn, &conversation_id)?, false));
    }

    let created = create_conversation(conn, caller_id, None, &[other_id.to_string()])?;
    Ok((created, true))
}

/// Get or create the conversation linked to a booking. Both booking parties
/// join as active members. Idempotent under race: the unique index on
/// booking_id rejects a duplicate insert and the loser re-reads the winner.
pub fn get_or_create_booking_conversation(
    conn: &Connection,
    booking_id: &str,
) -> StoreResult<(Conversation, bool)> {
    let booking = booking(conn, booking_id)?;

    if let Some(existing) = conversation_for_booking(conn, booking_id)? {
        return Ok((existing, false));
    }

    let now = now_millis();
    let conversation_id = Uuid::now_v7().to_string();
    let inserted = conn.execute(
        "INSERT INTO conversations (id, title, booking_id, created_at, updated_at)
         VALUES (?1, NULL, ?2, ?3, ?3)",
        params![conversation_id, booking_id, now],
    );

    match inserted {
        Ok(_) => {
            insert_participant(conn, &conversation_id, &booking.tutor_id, "member", now)?;
            insert_participant(conn, &conversation_id, &booking.student_id, "member", now)?;
            Ok((conversation(conn, &conversation_id)?, true))
        }
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            // Lost the creation race — another caller linked this booking first.
            conversation_for_booking(conn, booking_id)?
                .map(|c| (c, false))
                .ok_or(StoreError::NotFound)
        }
        Err(e) => Err(e.into()),
    }
}

// --- Participants ---

pub fn participant(
    conn: &Connection,
    conversation_id: &str,
    user_id: &str,
) -> StoreResult<Option<Participant>> {
    Ok(conn
        .query_row(
            "SELECT conversation_id, user_id, role, active, joined_at, last_read_at
             FROM conversation_participants
             WHERE conversation_id = ?1 AND user_id = ?2",
            params![conversation_id, user_id],
            |row| {
                Ok(Participant {
                    conversation_id: row.get(0)?,
                    user_id: row.get(1)?,
                    role: row.get(2)?,
                    active: row.get::<_, i64>(3)? != 0,
                    joined_at: row.get(4)?,
                    last_read_at: row.get(5)?,
                })
            },
        )
        .optional()?)
}

pub fn is_active_participant(
    conn: &Connection,
    conversation_id: &str,
    user_id: &str,
) -> StoreResult<bool> {
    Ok(participant(conn, conversation_id, user_id)?
        .map(|p| p.active)
        .unwrap_or(false))
}

/// User ids of all active participants — the fan-out recipient set.
pub fn active_participant_ids(
    conn: &Connection,
    conversation_id: &str,
) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM conversation_participants
         WHERE conversation_id = ?1 AND active = 1",
    )?;
    let ids = stmt
        .query_map(params![conversation_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// Add a user to a conversation (or reactivate a previous membership).
/// The caller must be an active participant themselves.
pub fn add_participant(
    conn: &Connection,
    conversation_id: &str,
    caller_id: &str,
    user_id: &str,
) -> StoreResult<()> {
    conversation(conn, conversation_id)?;
    if !is_active_participant(conn, conversation_id, caller_id)? {
        return Err(StoreError::NotAParticipant);
    }
    user_profile(conn, user_id)?;
    insert_participant(conn, conversation_id, user_id, "member", now_millis())
}

/// Deactivate the caller's membership. History is preserved; realtime
/// delivery stops until the user is re-added.
pub fn deactivate_participant(
    conn: &Connection,
    conversation_id: &str,
    user_id: &str,
) -> StoreResult<()> {
    conversation(conn, conversation_id)?;
    let changed = conn.execute(
        "UPDATE conversation_participants SET active = 0
         WHERE conversation_id = ?1 AND user_id = ?2 AND active = 1",
        params![conversation_id, user_id],
    )?;
    if changed == 0 {
        return Err(StoreError::NotAParticipant);
    }
    Ok(())
}

/// Move the user's read cursor to now.
pub fn mark_read(conn: &Connection, conversation_id: &str, user_id: &str) -> StoreResult<()> {
    conn.execute(
        "UPDATE conversation_participants SET last_read_at = ?3
         WHERE conversation_id = ?1 AND user_id = ?2",
        params![conversation_id, user_id, now_millis()],
    )?;
    Ok(())
}

// --- Messages ---

/// Persist a new message. The sender must be an active participant and the
/// trimmed content non-empty. Bumps the conversation's last-message time and
/// the sender's own read cursor (sending implies having read up to here).
pub fn insert_message(
    conn: &Connection,
    conversation_id: &str,
    sender_id: &str,
    content: &str,
    content_type: &str,
    attachment_url: Option<&str>,
) -> StoreResult<MessageResponse> {
    let content = content.trim();
    if content.is_empty() {
        return Err(StoreError::EmptyContent);
    }
    if content.len() > MAX_CONTENT_LENGTH {
        return Err(StoreError::ContentTooLong);
    }
    if !CONTENT_TYPES.contains(&content_type) {
        return Err(StoreError::InvalidContentType);
    }

    conversation(conn, conversation_id)?;
    if !is_active_participant(conn, conversation_id, sender_id)? {
        return Err(StoreError::NotAParticipant);
    }
    let sender = user_profile(conn, sender_id)?;

    let now = now_millis();
    conn.execute(
        "INSERT INTO messages (conversation_id, sender_id, content, content_type, attachment_url, deleted, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
        params![conversation_id, sender_id, content, content_type, attachment_url, now],
    )?;
    let message_id = conn.last_insert_rowid();

    conn.execute(
        "UPDATE conversations SET last_message_at = ?2, updated_at = ?2 WHERE id = ?1",
        params![conversation_id, now],
    )?;
    conn.execute(
        "UPDATE conversation_participants SET last_read_at = ?3
         WHERE conversation_id = ?1 AND user_id = ?2",
        params![conversation_id, sender_id, now],
    )?;

    Ok(MessageResponse {
        id: message_id,
        conversation_id: conversation_id.to_string(),
        sender_id: sender.id,
        sender_display_name: sender.display_name,
        sender_avatar_url: sender.avatar_url,
        content: content.to_string(),
        content_type: content_type.to_string(),
        attachment_url: attachment_url.map(|s| s.to_string()),
        created_at: now as u64,
    })
}

/// Paginated message history, creation order ascending (ties broken by id).
/// Returns (page, has_more).
pub fn conversation_messages(
    conn: &Connection,
    conversation_id: &str,
    limit: u32,
    offset: u32,
) -> StoreResult<(Vec<MessageResponse>, bool)> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.conversation_id, m.sender_id, u.display_name, u.avatar_url,
                m.content, m.content_type, m.attachment_url, m.created_at
         FROM messages m
         JOIN users u ON u.id = m.sender_id
         WHERE m.conversation_id = ?1 AND m.deleted = 0
         ORDER BY m.created_at ASC, m.id ASC
         LIMIT ?2 OFFSET ?3",
    )?;
    let rows = stmt
        .query_map(
            params![conversation_id, (limit + 1) as i64, offset as i64],
            message_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let has_more = rows.len() > limit as usize;
    let messages = rows.into_iter().take(limit as usize).collect();
    Ok((messages, has_more))
}

// --- Summaries ---

fn participants_info(conn: &Connection, conversation_id: &str) -> StoreResult<Vec<ParticipantInfo>> {
    let mut stmt = conn.prepare(
        "SELECT p.user_id, u.display_name, u.avatar_url, p.role, p.active
         FROM conversation_participants p
         JOIN users u ON u.id = p.user_id
         WHERE p.conversation_id = ?1
         ORDER BY p.joined_at ASC, p.user_id ASC",
    )?;
    let participants = stmt
        .query_map(params![conversation_id], |row| {
            Ok(ParticipantInfo {
                user_id: row.get(0)?,
                display_name: row.get(1)?,
                avatar_url: row.get(2)?,
                role: row.get(3)?,
                active: row.get::<_, i64>(4)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(participants)
}

fn last_message_preview(
    conn: &Connection,
    conversation_id: &str,
) -> StoreResult<Option<MessagePreview>> {
    Ok(conn
        .query_row(
            "SELECT m.sender_id, u.display_name, m.content, m.created_at
             FROM messages m
             JOIN users u ON u.id = m.sender_id
             WHERE m.conversation_id = ?1 AND m.deleted = 0
             ORDER BY m.created_at DESC, m.id DESC
             LIMIT 1",
            params![conversation_id],
            |row| {
                Ok(MessagePreview {
                    sender_id: row.get(0)?,
                    sender_display_name: row.get(1)?,
                    content: row.get(2)?,
                    created_at: row.get::<_, i64>(3)? as u64,
                })
            },
        )
        .optional()?)
}

fn unread_count(conn: &Connection, conversation_id: &str, user_id: &str) -> StoreResult<i64> {
    let last_read: Option<i64> = conn
        .query_row(
            "SELECT last_read_at FROM conversation_participants
             WHERE conversation_id = ?1 AND user_id = ?2",
            params![conversation_id, user_id],
            |row| row.get(0),
        )
        .optional()?
        .flatten();

    let count = match last_read {
        Some(cursor) => conn.query_row(
            "SELECT COUNT(*) FROM messages
             WHERE conversation_id = ?1 AND sender_id != ?2 AND deleted = 0 AND created_at > ?3",
            params![conversation_id, user_id, cursor],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*) FROM messages
             WHERE conversation_id = ?1 AND sender_id != ?2 AND deleted = 0",
            params![conversation_id, user_id],
            |row| row.get(0),
        )?,
    };
    Ok(count)
}

fn summarize(
    conn: &Connection,
    conversation: Conversation,
    viewer_id: &str,
) -> StoreResult<ConversationSummary> {
    let participants = participants_info(conn, &conversation.id)?;
    let last_message = last_message_preview(conn, &conversation.id)?;
    let unread = unread_count(conn, &conversation.id, viewer_id)?;
    Ok(ConversationSummary {
        id: conversation.id,
        title: conversation.title,
        booking_id: conversation.booking_id,
        created_at: conversation.created_at as u64,
        last_message_at: conversation.last_message_at.map(|t| t as u64),
        participants,
        last_message,
        unread_count: unread,
    })
}

pub fn conversation_summary(
    conn: &Connection,
    conversation_id: &str,
    viewer_id: &str,
) -> StoreResult<ConversationSummary> {
    let conversation = conversation(conn, conversation_id)?;
    summarize(conn, conversation, viewer_id)
}

/// All conversations the user actively participates in, most recent message
/// first (conversations with no messages yet sort last, by creation time).
pub fn list_conversations(
    conn: &Connection,
    user_id: &str,
) -> StoreResult<Vec<ConversationSummary>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.title, c.booking_id, c.created_at, c.updated_at, c.last_message_at
         FROM conversations c
         JOIN conversation_participants p ON p.conversation_id = c.id
         WHERE p.user_id = ?1 AND p.active = 1
         ORDER BY CASE WHEN c.last_message_at IS NULL THEN 1 ELSE 0 END,
                  c.last_message_at DESC,
                  c.created_at DESC",
    )?;
    let conversations = stmt
        .query_map(params![user_id], conversation_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    conversations
        .into_iter()
        .map(|c| summarize(conn, c, user_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn seed_user(conn: &Connection, id: &str, name: &str) {
        conn.execute(
            "INSERT INTO users (id, display_name, avatar_url, password_hash, created_at, updated_at)
             VALUES (?1, ?2, NULL, 'x', 0, 0)",
            params![id, name],
        )
        .unwrap();
    }

    fn seed_booking(conn: &Connection, id: &str, tutor: &str, student: &str) {
        conn.execute(
            "INSERT INTO bookings (id, tutor_id, student_id, scheduled_at, created_at)
             VALUES (?1, ?2, ?3, NULL, 0)",
            params![id, tutor, student],
        )
        .unwrap();
    }

    fn setup() -> Connection {
        let conn = open_in_memory();
        seed_user(&conn, "tutor", "Tina Tutor");
        seed_user(&conn, "student", "Sam Student");
        seed_user(&conn, "other", "Olly Other");
        conn
    }

    #[test]
    fn booking_conversation_is_created_once() {
        let conn = setup();
        seed_booking(&conn, "b1", "tutor", "student");

        let (first, created) = get_or_create_booking_conversation(&conn, "b1").unwrap();
        assert!(created);
        let (second, created) = get_or_create_booking_conversation(&conn, "b1").unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);

        let rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM conversations WHERE booking_id = 'b1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(rows, 1);

        let mut participants = active_participant_ids(&conn, &first.id).unwrap();
        participants.sort();
        assert_eq!(participants, vec!["student", "tutor"]);
    }

    #[test]
    fn booking_conversation_unknown_booking_is_not_found() {
        let conn = setup();
        assert!(matches!(
            get_or_create_booking_conversation(&conn, "missing"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn direct_conversation_is_reused_in_either_direction() {
        let conn = setup();
        let (first, created) = get_or_create_direct(&conn, "tutor", "student").unwrap();
        assert!(created);
        let (second, created) = get_or_create_direct(&conn, "student", "tutor").unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn message_ordering_breaks_timestamp_ties_by_id() {
        let conn = setup();
        let conversation =
            create_conversation(&conn, "tutor", None, &["student".to_string()]).unwrap();

        // Two rows sharing a creation timestamp — id decides the order.
        for content in ["first", "second"] {
            conn.execute(
                "INSERT INTO messages (conversation_id, sender_id, content, content_type, deleted, created_at, updated_at)
                 VALUES (?1, 'tutor', ?2, 'text', 0, 1000, 1000)",
                params![conversation.id, content],
            )
            .unwrap();
        }

        let (messages, has_more) =
            conversation_messages(&conn, &conversation.id, 50, 0).unwrap();
        assert!(!has_more);
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert!(messages[0].id < messages[1].id);
    }

    #[test]
    fn insert_message_enforces_participant_and_content_rules() {
        let conn = setup();
        let conversation =
            create_conversation(&conn, "tutor", None, &["student".to_string()]).unwrap();

        assert!(matches!(
            insert_message(&conn, &conversation.id, "other", "hi", "text", None),
            Err(StoreError::NotAParticipant)
        ));
        assert!(matches!(
            insert_message(&conn, &conversation.id, "tutor", "   ", "text", None),
            Err(StoreError::EmptyContent)
        ));
        assert!(matches!(
            insert_message(&conn, &conversation.id, "tutor", "hi", "video", None),
            Err(StoreError::InvalidContentType)
        ));
        assert!(matches!(
            insert_message(&conn, "missing", "tutor", "hi", "text", None),
            Err(StoreError::NotFound)
        ));

        let message =
            insert_message(&conn, &conversation.id, "tutor", "  hello  ", "text", None).unwrap();
        assert_eq!(message.content, "hello");
        assert_eq!(message.sender_display_name, "Tina Tutor");

        let refreshed = conversation_summary(&conn, &conversation.id, "tutor").unwrap();
        assert_eq!(refreshed.last_message_at, Some(message.created_at));
        // Sending implies having read up to that point.
        assert_eq!(refreshed.unread_count, 0);
    }

    #[test]
    fn leaving_stops_delivery_until_re_added() {
        let conn = setup();
        let conversation =
            create_conversation(&conn, "tutor", None, &["student".to_string()]).unwrap();

        deactivate_participant(&conn, &conversation.id, "student").unwrap();
        assert_eq!(
            active_participant_ids(&conn, &conversation.id).unwrap(),
            vec!["tutor"]
        );
        assert!(matches!(
            insert_message(&conn, &conversation.id, "student", "hi", "text", None),
            Err(StoreError::NotAParticipant)
        ));
        // Leaving twice is rejected, not silently allowed.
        assert!(matches!(
            deactivate_participant(&conn, &conversation.id, "student"),
            Err(StoreError::NotAParticipant)
        ));

        add_participant(&conn, &conversation.id, "tutor", "student").unwrap();
        let membership = participant(&conn, &conversation.id, "student")
            .unwrap()
            .unwrap();
        assert!(membership.active);
    }

    #[test]
    fn unread_count_tracks_read_cursor() {
        let conn = setup();
        let conversation =
            create_conversation(&conn, "tutor", None, &["student".to_string()]).unwrap();

        insert_message(&conn, &conversation.id, "tutor", "one", "text", None).unwrap();
        insert_message(&conn, &conversation.id, "tutor", "two", "text", None).unwrap();

        let summary = conversation_summary(&conn, &conversation.id, "student").unwrap();
        assert_eq!(summary.unread_count, 2);
        let preview = summary.last_message.unwrap();
        assert_eq!(preview.content, "two");

        mark_read(&conn, &conversation.id, "student").unwrap();
        let summary = conversation_summary(&conn, &conversation.id, "student").unwrap();
        assert_eq!(summary.unread_count, 0);
    }
}
