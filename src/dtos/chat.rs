//! Chat DTOs: listing summaries, pagination envelopes, unread counters.

use crate::entities::{Chat, ChatKind, ChatParticipant, Message};
use crate::repositories::chat::ChatSummaryRow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MessageDTO;

/// Denormalized summary of the most recent message of a chat.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LastMessageDTO {
    pub content: String,
    pub sender_id: i64,
    pub sent_at: DateTime<Utc>,
}

impl LastMessageDTO {
    /// Assembles the summary from the chat's denormalized columns.
    /// Returns `None` until the first message is appended.
    pub fn from_chat(chat: &Chat) -> Option<Self> {
        Some(Self {
            content: chat.last_message_content.clone()?,
            sender_id: chat.last_message_sender_id?,
            sent_at: chat.last_message_at?,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ParticipantDTO {
    pub user_id: i64,
    pub display_name: String,
}

impl From<ChatParticipant> for ParticipantDTO {
    fn from(value: ChatParticipant) -> Self {
        Self {
            user_id: value.user_id,
            display_name: value.display_name,
        }
    }
}

/// One entry of `GET /chat/list`: the conversation seen from the caller's
/// side, with the partner's identity and the caller's unread counter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChatSummaryDTO {
    pub chat_id: i64,
    pub chat_kind: ChatKind,
    pub partner: ParticipantDTO,
    pub last_message: Option<LastMessageDTO>,
    pub unread_count: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<ChatSummaryRow> for ChatSummaryDTO {
    fn from(row: ChatSummaryRow) -> Self {
        let last_message = match (
            row.last_message_content,
            row.last_message_sender_id,
            row.last_message_at,
        ) {
            (Some(content), Some(sender_id), Some(sent_at)) => Some(LastMessageDTO {
                content,
                sender_id,
                sent_at,
            }),
            _ => None,
        };
        Self {
            chat_id: row.chat_id,
            chat_kind: row.chat_kind,
            partner: ParticipantDTO {
                user_id: row.partner_id,
                display_name: row.partner_name,
            },
            last_message,
            unread_count: row.unread_count,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaginationDTO {
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

/// Response of `GET /chat/list`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChatListDTO {
    pub chats: Vec<ChatSummaryDTO>,
    pub pagination: PaginationDTO,
}

/// Response of `GET /chat/{chat_id}/messages`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MessagesPageDTO {
    pub chat_id: i64,
    pub participants: Vec<ParticipantDTO>,
    pub messages: Vec<MessageDTO>,
    pub pagination: PaginationDTO,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChatUnreadDTO {
    pub chat_id: i64,
    pub unread: i64,
}

/// Response of `GET /chat/unread-count`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UnreadCountDTO {
    pub total_unread: i64,
    pub chat_counts: Vec<ChatUnreadDTO>,
}

/// Chat fields piggybacked on a `new_message` event so clients can update
/// their conversation list without refetching.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChatPatchDTO {
    pub chat_id: i64,
    pub last_message: Option<LastMessageDTO>,
    pub updated_at: DateTime<Utc>,
}

impl ChatPatchDTO {
    /// Patch reflecting a freshly appended message. Built from the message
    /// itself: a `Chat` row read before the append still carries the
    /// previous last-message columns.
    pub fn from_message(message: &Message) -> Self {
        Self {
            chat_id: message.chat_id,
            last_message: Some(LastMessageDTO {
                content: message.content.clone(),
                sender_id: message.sender_id,
                sent_at: message.created_at,
            }),
            updated_at: message.created_at,
        }
    }
}
