//! Chat services: directory search, conversation listing, unread totals,
//! find-or-create.

use crate::core::{AppError, AppState};
use crate::dtos::{
    ChatListDTO, ChatSummaryDTO, ChatUnreadDTO, LastMessageDTO, PageQuery, PaginationDTO,
    ParticipantDTO, SearchQuery, UnreadCountDTO, UserDTO,
};
use crate::entities::User;
use crate::repositories::Read;
use axum::{
    Extension,
    extract::{Json, Path, Query, State},
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// `GET /chat/search-doctors?query=` - directory search, caller excluded.
#[instrument(skip(state, current_user), fields(user_id = %current_user.user_id))]
pub async fn search_doctors(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<User>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<UserDTO>>, AppError> {
    debug!(query = %params.query, "Searching doctors");
    let users = state
        .user
        .search(params.query.trim(), current_user.user_id)
        .await?;
    info!(found = users.len(), "Doctor search completed");
    Ok(Json(users.into_iter().map(UserDTO::from).collect()))
}

/// `GET /chat/unread-count` - total and per-chat unread counters.
#[instrument(skip(state, current_user), fields(user_id = %current_user.user_id))]
pub async fn unread_count(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<User>,
) -> Result<Json<UnreadCountDTO>, AppError> {
    let counts = state.chat.unread_counts(current_user.user_id).await?;
    let total_unread = counts.iter().map(|(_, unread)| unread).sum();
    let chat_counts = counts
        .into_iter()
        .map(|(chat_id, unread)| ChatUnreadDTO { chat_id, unread })
        .collect();
    Ok(Json(UnreadCountDTO {
        total_unread,
        chat_counts,
    }))
}

/// `GET /chat/list?page&limit` - active conversations, most recently
/// active first.
#[instrument(skip(state, current_user), fields(user_id = %current_user.user_id))]
pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<User>,
    Query(params): Query<PageQuery>,
) -> Result<Json<ChatListDTO>, AppError> {
    let (page, limit) = params.normalize();
    let (rows, has_more) = state
        .chat
        .list_for_user(current_user.user_id, page, limit)
        .await?;

    info!(returned = rows.len(), "Conversation list served");
    Ok(Json(ChatListDTO {
        chats: rows.into_iter().map(ChatSummaryDTO::from).collect(),
        pagination: PaginationDTO {
            page,
            limit,
            has_more,
        },
    }))
}

/// `GET /chat/{recipient_id}` - find-or-create the direct conversation
/// with that identity. 400 on self-chat, 404 on unknown recipient.
#[instrument(skip(state, current_user), fields(user_id = %current_user.user_id, recipient_id))]
pub async fn open_chat_with(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<User>,
    Path(recipient_id): Path<i64>,
) -> Result<Json<ChatSummaryDTO>, AppError> {
    if recipient_id == current_user.user_id {
        warn!("Attempted self-chat");
        return Err(AppError::bad_request("You cannot open a chat with yourself"));
    }

    let recipient = state
        .user
        .read(&recipient_id)
        .await?
        .ok_or_else(|| AppError::not_found("Recipient not found"))?;

    let (chat, created) = state
        .chat
        .find_or_create_direct(
            (current_user.user_id, &current_user.display_name),
            (recipient.user_id, &recipient.display_name),
        )
        .await?;

    if created {
        info!(chat_id = chat.chat_id, "New direct chat opened");
    }

    // The caller's unread counter lives on their membership row.
    let unread_count = state
        .chat
        .read_with_participants(&chat.chat_id)
        .await?
        .and_then(|(_, participants)| {
            participants
                .iter()
                .find(|p| p.user_id == current_user.user_id)
                .map(|p| p.unread_count)
        })
        .unwrap_or(0);

    Ok(Json(ChatSummaryDTO {
        chat_id: chat.chat_id,
        chat_kind: chat.chat_kind,
        partner: ParticipantDTO {
            user_id: recipient.user_id,
            display_name: recipient.display_name,
        },
        last_message: LastMessageDTO::from_chat(&chat),
        unread_count,
        updated_at: chat.updated_at,
    }))
}
