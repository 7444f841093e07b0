//! Chat entity - a persisted two-party conversation.

use super::enums::ChatKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conversation row. The `last_message_*` columns are a denormalized
/// summary of the most recent message and are rewritten on every append
/// in the same transaction, so they never drift from the message log.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Chat {
    pub chat_id: i64,
    pub chat_kind: ChatKind,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_content: Option<String>,
    pub last_message_sender_id: Option<i64>,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Membership row: one participant of a chat, with the display-name
/// snapshot taken at creation and that participant's unread counter.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct ChatParticipant {
    pub chat_id: i64,
    pub user_id: i64,
    pub display_name: String,
    pub unread_count: i64,
}
