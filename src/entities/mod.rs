//! Persisted entities of the chat subsystem.

pub mod chat;
pub mod enums;
pub mod message;
pub mod user;

pub use chat::{Chat, ChatParticipant};
pub use enums::{ChatKind, MessageType};
pub use message::{DELETED_MESSAGE_PLACEHOLDER, Message, ReadReceipt};
pub use user::User;
