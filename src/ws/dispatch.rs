//! Notification dispatcher: room fan-out, direct delivery and the
//! best-effort offline hint path.

use crate::core::AppState;
use crate::dtos::ServerEvent;
use crate::entities::User;
use crate::ws::rooms::RoomEvent;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc::error::SendError;
use tracing::{debug, info, instrument, warn};

use super::presence::SessionSignal;

/// External push-notification collaborator for recipients with no live
/// connection. Failures are logged and swallowed by the caller; delivery
/// is a hint, never a guarantee.
#[async_trait]
pub trait PushNotifier: Send + Sync {
    async fn notify(
        &self,
        recipients: &[i64],
        summary: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Default notifier: records the hint in the log and does nothing else.
pub struct LogOnlyNotifier;

#[async_trait]
impl PushNotifier for LogOnlyNotifier {
    async fn notify(
        &self,
        recipients: &[i64],
        summary: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(?recipients, summary, "Offline notification hint");
        Ok(())
    }
}

/// Broadcasts an event to every connection subscribed to the room,
/// optionally excluding one member (the event's own origin).
pub fn broadcast_to_room(
    state: &AppState,
    chat_id: i64,
    exclude: Option<i64>,
    event: ServerEvent,
) -> usize {
    state.rooms.send(
        chat_id,
        RoomEvent {
            exclude,
            event: Arc::new(event),
        },
    )
}

/// Delivers an event directly to a user's active connection, bypassing
/// rooms. Returns whether the user had a live session.
pub fn send_to_user(state: &AppState, user_id: i64, event: ServerEvent) -> bool {
    let Some(tx) = state.presence.session_of(user_id) else {
        debug!(user_id, "User offline, direct event not sent");
        return false;
    };
    match tx.send(SessionSignal::Deliver(Arc::new(event))) {
        Ok(()) => true,
        Err(SendError(_)) => {
            debug!(user_id, "Session channel closed, direct event dropped");
            false
        }
    }
}

/// Best-effort offline hint; never surfaces a failure to the sender.
#[instrument(skip(state, recipients, summary))]
pub async fn notify_offline(state: &AppState, recipients: &[i64], summary: &str) {
    if recipients.is_empty() {
        return;
    }
    if let Err(e) = state.notifier.notify(recipients, summary).await {
        warn!(error = %e, "Push notification hint failed, dropping");
    }
}

/// Fans a presence transition out to every online contact of `user`
/// (anyone sharing a direct chat with them).
#[instrument(skip(state, user), fields(user_id = user.user_id, status))]
pub async fn broadcast_status(state: &AppState, user: &User, status: &str) {
    let partners = match state.chat.partner_ids(user.user_id).await {
        Ok(partners) => partners,
        Err(e) => {
            // Presence updates are advisory; a store hiccup must not take
            // the session down.
            warn!(error = %e, "Failed to load contacts for status update");
            return;
        }
    };

    let last_seen = state
        .presence
        .last_seen(user.user_id)
        .unwrap_or_else(Utc::now);

    let mut reached = 0usize;
    for partner_id in partners {
        let event = ServerEvent::ContactStatusUpdate {
            user_id: user.user_id,
            user_name: user.display_name.clone(),
            status: status.to_string(),
            last_seen,
        };
        if send_to_user(state, partner_id, event) {
            reached += 1;
        }
    }
    debug!(reached, status, "Contact status update fanned out");
}
