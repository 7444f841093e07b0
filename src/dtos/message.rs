//! Message DTOs.

use crate::entities::{Message, MessageType, ReadReceipt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Full message representation as returned to clients.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MessageDTO {
    pub message_id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub content: String,
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub read_by: Vec<ReadReceipt>,
}

impl From<Message> for MessageDTO {
    fn from(value: Message) -> Self {
        Self {
            message_id: value.message_id,
            chat_id: value.chat_id,
            sender_id: value.sender_id,
            sender_name: value.sender_name,
            content: value.content,
            message_type: value.message_type,
            file_url: value.file_url,
            file_name: value.file_name,
            is_edited: value.is_edited,
            edited_at: value.edited_at,
            created_at: value.created_at,
            read_by: value.read_by,
        }
    }
}

/// Message variant a client may create. Narrower than [`MessageType`]:
/// there is no `Deleted` here, so a client-supplied `"deleted"` type
/// fails deserialization instead of reaching the store.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NewMessageKind {
    Text,
    Image,
    File,
    Voice,
}

impl From<NewMessageKind> for MessageType {
    fn from(value: NewMessageKind) -> Self {
        match value {
            NewMessageKind::Text => MessageType::Text,
            NewMessageKind::Image => MessageType::Image,
            NewMessageKind::File => MessageType::File,
            NewMessageKind::Voice => MessageType::Voice,
        }
    }
}

/// Body of `POST /chat/{chat_id}/send` and of the `send_message` event.
#[derive(Serialize, Deserialize, Debug, Clone, Validate)]
pub struct NewMessagePayload {
    #[validate(length(
        min = 1,
        max = 5000,
        message = "Message content must be between 1 and 5000 characters"
    ))]
    pub content: String,
    pub message_type: Option<NewMessageKind>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
}
