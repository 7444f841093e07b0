//! Handlers for events arriving on the live channel.
//!
//! Errors never close the connection: each handler's failure is converted
//! into a scoped `error` event delivered back to the originating socket.

use crate::core::error::AppError;
use crate::core::state::AppState;
use crate::dtos::{ClientEvent, NewMessagePayload, ServerEvent};
use crate::entities::{Chat, ChatParticipant, User};
use crate::services::message::{apply_mark_read, deliver_message};
use crate::ws::dispatch;
use crate::ws::presence::SessionSignal;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, instrument, warn};

/// Routes one decoded client event. Authorization is re-checked per event
/// against the store; nothing is trusted from the connection beyond the
/// authenticated identity.
#[instrument(skip(state, user, internal_tx, event), fields(user_id = %user.user_id))]
pub async fn process_event(
    state: &AppState,
    user: &User,
    internal_tx: &UnboundedSender<SessionSignal>,
    event: ClientEvent,
) {
    let outcome = match event {
        ClientEvent::JoinChat { chat_id } => {
            handle_join_chat(state, user, internal_tx, chat_id).await
        }
        ClientEvent::LeaveChat { chat_id } => {
            handle_leave_chat(state, user, internal_tx, chat_id).await
        }
        ClientEvent::SendMessage { chat_id, payload } => {
            handle_send_message(state, user, internal_tx, chat_id, payload).await
        }
        ClientEvent::MarkMessagesRead { chat_id } => {
            handle_mark_read(state, user, chat_id).await
        }
        ClientEvent::TypingStart { chat_id } => {
            handle_typing(state, user, chat_id, true).await
        }
        ClientEvent::TypingStop { chat_id } => {
            handle_typing(state, user, chat_id, false).await
        }
    };

    if let Err(e) = outcome {
        warn!(status = %e.status(), message = e.message(), "Event rejected");
        let _ = internal_tx.send(SessionSignal::Deliver(Arc::new(ServerEvent::Error {
            message: e.message().to_string(),
        })));
    }
}

/// Loads the chat and verifies the caller is a participant.
async fn load_member_chat(
    state: &AppState,
    user: &User,
    chat_id: i64,
) -> Result<(Chat, Vec<ChatParticipant>), AppError> {
    let (chat, participants) = state
        .chat
        .read_with_participants(&chat_id)
        .await?
        .ok_or_else(|| AppError::not_found("Chat not found"))?;
    if !participants.iter().any(|p| p.user_id == user.user_id) {
        return Err(AppError::forbidden("Not a participant of this chat"));
    }
    Ok((chat, participants))
}

async fn require_membership(
    state: &AppState,
    user: &User,
    chat_id: i64,
) -> Result<(), AppError> {
    if state.chat.is_participant(chat_id, user.user_id).await? {
        Ok(())
    } else {
        Err(AppError::forbidden("Not a participant of this chat"))
    }
}

async fn handle_mark_read(
    state: &AppState,
    user: &User,
    chat_id: i64,
) -> Result<(), AppError> {
    require_membership(state, user, chat_id).await?;
    apply_mark_read(state, user, chat_id).await?;
    Ok(())
}

async fn handle_join_chat(
    state: &AppState,
    user: &User,
    internal_tx: &UnboundedSender<SessionSignal>,
    chat_id: i64,
) -> Result<(), AppError> {
    load_member_chat(state, user, chat_id).await?;

    let _ = internal_tx.send(SessionSignal::JoinRoom(chat_id));

    // Opening the room implies the backlog was seen.
    apply_mark_read(state, user, chat_id).await?;

    let _ = internal_tx.send(SessionSignal::Deliver(Arc::new(ServerEvent::JoinedChat {
        chat_id,
        success: true,
    })));
    info!(chat_id, "User joined chat room");
    Ok(())
}

async fn handle_leave_chat(
    state: &AppState,
    user: &User,
    internal_tx: &UnboundedSender<SessionSignal>,
    chat_id: i64,
) -> Result<(), AppError> {
    let _ = internal_tx.send(SessionSignal::LeaveRoom(chat_id));
    let _ = internal_tx.send(SessionSignal::Deliver(Arc::new(ServerEvent::LeftChat {
        chat_id,
        success: true,
    })));

    // Departure notice goes to the remaining members only.
    dispatch::broadcast_to_room(
        state,
        chat_id,
        Some(user.user_id),
        ServerEvent::UserLeftChat {
            chat_id,
            user_id: user.user_id,
            user_name: user.display_name.clone(),
        },
    );
    info!(chat_id, "User left chat room");
    Ok(())
}

async fn handle_send_message(
    state: &AppState,
    user: &User,
    internal_tx: &UnboundedSender<SessionSignal>,
    chat_id: i64,
    payload: NewMessagePayload,
) -> Result<(), AppError> {
    let (chat, participants) = load_member_chat(state, user, chat_id).await?;

    let message = deliver_message(state, user, &chat, &participants, payload).await?;

    // Ack through the internal channel so the sender always learns the
    // persisted id, even if it is excluded from the room broadcast.
    let _ = internal_tx.send(SessionSignal::Deliver(Arc::new(ServerEvent::MessageSent {
        success: true,
        message_id: message.message_id,
        timestamp: message.created_at,
    })));
    Ok(())
}

/// Typing indicators are ephemeral: never persisted, fanned out to the
/// other room members only.
async fn handle_typing(
    state: &AppState,
    user: &User,
    chat_id: i64,
    started: bool,
) -> Result<(), AppError> {
    require_membership(state, user, chat_id).await?;

    let event = if started {
        ServerEvent::UserTyping {
            user_id: user.user_id,
            user_name: user.display_name.clone(),
            chat_id,
        }
    } else {
        ServerEvent::UserStoppedTyping {
            user_id: user.user_id,
            user_name: user.display_name.clone(),
            chat_id,
        }
    };
    dispatch::broadcast_to_room(state, chat_id, Some(user.user_id), event);
    Ok(())
}
