//! Data transfer objects: REST payloads and the WebSocket event taxonomy.

pub mod chat;
pub mod message;
pub mod query;
pub mod user;
pub mod ws_event;

pub use chat::{
    ChatListDTO, ChatPatchDTO, ChatSummaryDTO, ChatUnreadDTO, LastMessageDTO, MessagesPageDTO,
    PaginationDTO, ParticipantDTO, UnreadCountDTO,
};
pub use message::{MessageDTO, NewMessageKind, NewMessagePayload};
pub use query::{PageQuery, SearchQuery};
pub use user::UserDTO;
pub use ws_event::{ClientEvent, ServerEvent};
