pub mod connection;
pub mod dispatch;
pub mod event_handlers;
pub mod presence;
pub mod rooms;

use std::sync::Arc;

use axum::{
    Extension,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};
use tracing::info;

use crate::core::state::AppState;
use crate::entities::User;

/// Capacity of each room's broadcast channel. A receiver that falls this far
/// behind starts losing events and is reported as lagged by its stream.
pub const BROADCAST_CHANNEL_CAPACITY: usize = 64;

/// Seconds of client silence after which the listen task treats the
/// connection as dead. Browsers answer protocol pings automatically, so any
/// live connection produces frames well within this window.
pub const CLIENT_TIMEOUT_SECS: u64 = 300;

/// Upgrades an authenticated HTTP request to a websocket session. Identity
/// comes from the authentication middleware, never from the socket itself.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> impl IntoResponse {
    info!(user_id = %user.user_id, "websocket upgrade requested");
    ws.on_upgrade(move |socket| connection::handle_socket(socket, state, user))
}
