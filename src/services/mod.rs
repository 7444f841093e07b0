//! REST façade: stateless HTTP operations used by clients before and
//! alongside the live channel.

pub mod chat;
pub mod message;

pub use chat::{list_chats, open_chat_with, search_doctors, unread_count};
pub use message::{
    apply_mark_read, deliver_message, delete_message, get_chat_messages, mark_chat_read,
    send_message,
};

/// Health probe.
pub async fn root() -> &'static str {
    "medichat server is running"
}
