//! Enumerations shared by entities and DTOs.

use serde::{Deserialize, Serialize};

/// Variant of a stored message.
///
/// `Deleted` is a terminal state: it is reachable only through the
/// soft-delete transition and is never accepted from a client at creation
/// time (the wire-level creation payload uses [`crate::dtos::NewMessageKind`],
/// which has no `Deleted` variant).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    File,
    Voice,
    Deleted,
}

/// Kind of a conversation. Only `Direct` chats are ever created; `Group`
/// exists as a schema placeholder and is never populated.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Direct,
    Group,
}
