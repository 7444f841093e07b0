//! Conversation store repositories.
//!
//! Queries use the runtime sqlx API (`query_as` + `FromRow`) so the crate
//! builds without a live database. Every multi-row mutation that must stay
//! consistent (message insert + last-message summary + unread counters)
//! runs inside a single transaction; uniqueness of the direct-chat pair is
//! enforced by the store's unique index, not by in-process locking.

pub mod chat;
pub mod message;
pub mod traits;
pub mod user;

pub use chat::ChatRepository;
pub use message::MessageRepository;
pub use traits::Read;
pub use user::UserRepository;
