//! Message services: history retrieval, send, read, soft delete.
//!
//! `deliver_message` and `apply_mark_read` are the single
//! persist-and-dispatch path shared by the REST façade and the WebSocket
//! session manager, so a message created over HTTP is still broadcast
//! live and offline-hinted exactly like one sent over the socket.

use crate::core::{AppError, AppState, ChatContext};
use crate::dtos::{
    ChatPatchDTO, MessageDTO, MessagesPageDTO, NewMessagePayload, PageQuery,
    PaginationDTO, ParticipantDTO, ServerEvent,
};
use crate::entities::{Chat, ChatParticipant, Message, MessageType, User};
use crate::repositories::Read;
use crate::repositories::message::NewMessageRecord;
use crate::ws::dispatch;
use axum::{
    Extension,
    extract::{Json, Path, Query, State},
};
use axum_macros::debug_handler;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

/// Persists a message and dispatches it: append (atomic with summary and
/// unread counters), `new_message` broadcast to the room, offline hint for
/// recipients without a live connection. Returns the stored message; the
/// caller is expected to have loaded the chat and verified nothing beyond
/// what this function re-checks.
#[instrument(skip_all, fields(chat_id = chat.chat_id, sender_id = sender.user_id))]
pub async fn deliver_message(
    state: &AppState,
    sender: &User,
    chat: &Chat,
    participants: &[ChatParticipant],
    payload: NewMessagePayload,
) -> Result<Message, AppError> {
    // Sender must be a participant; enforced in the write path even when
    // the transport-level middleware already checked.
    if !participants.iter().any(|p| p.user_id == sender.user_id) {
        warn!("Sender is not a participant of the chat");
        return Err(AppError::forbidden("You are not a participant of this chat"));
    }

    let content = payload.content.trim().to_string();
    if content.is_empty() {
        return Err(AppError::bad_request("Message content cannot be empty"));
    }
    let normalized = NewMessagePayload {
        content,
        ..payload
    };
    normalized.validate()?;

    let message_type: MessageType = normalized
        .message_type
        .map(MessageType::from)
        .unwrap_or(MessageType::Text);

    let message = state
        .msg
        .append(NewMessageRecord {
            chat_id: chat.chat_id,
            sender_id: sender.user_id,
            sender_name: sender.display_name.clone(),
            content: normalized.content,
            message_type,
            file_url: normalized.file_url,
            file_name: normalized.file_name,
        })
        .await?;

    // Live fan-out to the room, with the chat patch clients use to update
    // their conversation list without refetching.
    let patch = ChatPatchDTO::from_message(&message);
    dispatch::broadcast_to_room(
        state,
        chat.chat_id,
        None,
        ServerEvent::NewMessage {
            chat_id: chat.chat_id,
            message: MessageDTO::from(message.clone()),
            chat: patch,
        },
    );

    // Hint path for participants with no live connection.
    let offline: Vec<i64> = participants
        .iter()
        .map(|p| p.user_id)
        .filter(|&id| id != sender.user_id && !state.presence.is_online(id))
        .collect();
    dispatch::notify_offline(
        state,
        &offline,
        &format!("New message from {}", sender.display_name),
    )
    .await;

    Ok(message)
}

/// Zeroes the caller's unread counter, records receipts for everything
/// they had not read yet and broadcasts the read receipt to the room.
/// Idempotent end to end.
#[instrument(skip(state, reader), fields(chat_id, user_id = reader.user_id))]
pub async fn apply_mark_read(
    state: &AppState,
    reader: &User,
    chat_id: i64,
) -> Result<DateTime<Utc>, AppError> {
    let read_at = state.msg.mark_read(chat_id, reader.user_id).await?;

    dispatch::broadcast_to_room(
        state,
        chat_id,
        None,
        ServerEvent::MessagesRead {
            chat_id,
            user_id: reader.user_id,
            user_name: reader.display_name.clone(),
            read_at,
        },
    );

    Ok(read_at)
}

/// `GET /chat/{chat_id}/messages?page&limit` - newest-first history page.
/// Side effect: the caller's unread counter drops to zero.
#[instrument(skip(state, current_user, ctx), fields(user_id = %current_user.user_id))]
pub async fn get_chat_messages(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<User>,
    Extension(ctx): Extension<ChatContext>,
    Query(params): Query<PageQuery>,
) -> Result<Json<MessagesPageDTO>, AppError> {
    let (page, limit) = params.normalize();
    let (messages, has_more) = state.msg.find_page(ctx.chat.chat_id, page, limit).await?;

    // Fetching history counts as reading it.
    apply_mark_read(&state, &current_user, ctx.chat.chat_id).await?;

    debug!(returned = messages.len(), "History page served");
    Ok(Json(MessagesPageDTO {
        chat_id: ctx.chat.chat_id,
        participants: ctx
            .participants
            .into_iter()
            .map(ParticipantDTO::from)
            .collect(),
        messages: messages.into_iter().map(MessageDTO::from).collect(),
        pagination: PaginationDTO {
            page,
            limit,
            has_more,
        },
    }))
}

/// `POST /chat/{chat_id}/send` - create a message from the REST side.
#[debug_handler]
#[instrument(skip(state, current_user, ctx, payload), fields(user_id = %current_user.user_id))]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<User>,
    Extension(ctx): Extension<ChatContext>,
    Json(payload): Json<NewMessagePayload>,
) -> Result<Json<MessageDTO>, AppError> {
    let message =
        deliver_message(&state, &current_user, &ctx.chat, &ctx.participants, payload).await?;
    info!(message_id = message.message_id, "Message sent via REST");
    Ok(Json(MessageDTO::from(message)))
}

/// `PUT /chat/{chat_id}/read` - mark the conversation read.
#[instrument(skip(state, current_user, ctx), fields(user_id = %current_user.user_id))]
pub async fn mark_chat_read(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<User>,
    Extension(ctx): Extension<ChatContext>,
) -> Result<Json<Value>, AppError> {
    let read_at = apply_mark_read(&state, &current_user, ctx.chat.chat_id).await?;
    Ok(Json(json!({ "success": true, "read_at": read_at })))
}

/// `DELETE /chat/{chat_id}/messages/{message_id}` - soft delete, gated to
/// the original sender. Broadcasts `message_deleted` so clients in the
/// room see the tombstone without refetching.
#[instrument(skip(state, current_user, ctx), fields(user_id = %current_user.user_id))]
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<User>,
    Extension(ctx): Extension<ChatContext>,
    Path((_chat_id, message_id)): Path<(i64, i64)>,
) -> Result<Json<Value>, AppError> {
    let message = state
        .msg
        .read(&message_id)
        .await?
        .filter(|m| m.chat_id == ctx.chat.chat_id)
        .ok_or_else(|| AppError::not_found("Message not found"))?;

    if message.sender_id != current_user.user_id {
        warn!(message_id, "Delete attempt by non-sender");
        return Err(AppError::forbidden("Only the sender can delete a message"));
    }

    state.msg.soft_delete(message_id, ctx.chat.chat_id).await?;
    dispatch::broadcast_to_room(
        &state,
        ctx.chat.chat_id,
        None,
        ServerEvent::MessageDeleted {
            chat_id: ctx.chat.chat_id,
            message_id,
        },
    );

    info!(message_id, "Message soft-deleted");
    Ok(Json(json!({ "success": true })))
}
