//! Message entity - one entry of a conversation's append-only log.

use super::enums::MessageType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed content a message is rewritten to by soft delete.
pub const DELETED_MESSAGE_PLACEHOLDER: &str = "This message was deleted";

#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Message {
    pub message_id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    // Sender name denormalized so listings need no join against users.
    pub sender_name: String,
    pub content: String,
    pub message_type: MessageType,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Read receipts, at most one per user. Loaded separately from
    /// `message_reads`; not a column.
    #[sqlx(skip)]
    #[serde(default)]
    pub read_by: Vec<ReadReceipt>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ReadReceipt {
    pub user_id: i64,
    pub read_at: DateTime<Utc>,
}

impl Message {
    /// Whether `user_id` already has a read receipt on this message.
    pub fn is_read_by(&self, user_id: i64) -> bool {
        self.read_by.iter().any(|r| r.user_id == user_id)
    }
}
