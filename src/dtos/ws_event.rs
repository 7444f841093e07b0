//! WebSocket event taxonomy.
//!
//! Every frame is a tagged JSON object: `{"event": "<name>", "data": {...}}`.
//! Variant names map to the wire event names through `rename_all`.

use super::{ChatPatchDTO, MessageDTO, NewMessagePayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events a client may send over the live channel.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinChat {
        chat_id: i64,
    },
    LeaveChat {
        chat_id: i64,
    },
    SendMessage {
        chat_id: i64,
        #[serde(flatten)]
        payload: NewMessagePayload,
    },
    MarkMessagesRead {
        chat_id: i64,
    },
    TypingStart {
        chat_id: i64,
    },
    TypingStop {
        chat_id: i64,
    },
}

/// Events the server emits, either directly to one connection or through
/// a room broadcast.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Ready acknowledgment: authentication succeeded and the connection is
    /// registered in the presence map. Distinguishes "transport open" from
    /// "ready to operate".
    Connected {
        user_id: i64,
    },
    JoinedChat {
        chat_id: i64,
        success: bool,
    },
    LeftChat {
        chat_id: i64,
        success: bool,
    },
    /// Departure notice broadcast to the remaining room members.
    UserLeftChat {
        chat_id: i64,
        user_id: i64,
        user_name: String,
    },
    NewMessage {
        chat_id: i64,
        message: MessageDTO,
        chat: ChatPatchDTO,
    },
    /// Ack to the sender of a `send_message` event.
    MessageSent {
        success: bool,
        message_id: i64,
        timestamp: DateTime<Utc>,
    },
    MessagesRead {
        chat_id: i64,
        user_id: i64,
        user_name: String,
        read_at: DateTime<Utc>,
    },
    UserTyping {
        user_id: i64,
        user_name: String,
        chat_id: i64,
    },
    UserStoppedTyping {
        user_id: i64,
        user_name: String,
        chat_id: i64,
    },
    MessageDeleted {
        chat_id: i64,
        message_id: i64,
    },
    ContactStatusUpdate {
        user_id: i64,
        user_name: String,
        status: String,
        last_seen: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}
