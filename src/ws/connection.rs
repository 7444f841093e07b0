//! Per-connection session lifecycle: split socket, listen/write tasks,
//! graceful teardown with a reconnect grace period.

use crate::core::state::AppState;
use crate::dtos::{ClientEvent, ServerEvent};
use crate::entities::User;
use crate::ws::event_handlers::process_event;
use crate::ws::presence::{ConnId, SessionSignal, next_conn_id};
use crate::ws::rooms::RoomEvent;
use crate::ws::{CLIENT_TIMEOUT_SECS, dispatch};
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::time::{Duration, sleep, timeout};
use tokio_stream::StreamMap;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info, instrument, warn};

#[instrument(skip(ws, state, user), fields(user_id = %user.user_id))]
pub async fn handle_socket(ws: WebSocket, state: Arc<AppState>, user: User) {
    info!("WebSocket connection established");

    let conn_id = next_conn_id();
    let (ws_tx, ws_rx) = ws.split();

    // Internal channel: the listen task and the dispatchers feed signals,
    // the write task is the only socket writer.
    let (int_tx, int_rx) = unbounded_channel::<SessionSignal>();

    state.presence.register(user.user_id, conn_id, int_tx.clone());

    // Ready ack: the connection is authenticated and registered, distinct
    // from the transport merely being open.
    let _ = int_tx.send(SessionSignal::Deliver(Arc::new(ServerEvent::Connected {
        user_id: user.user_id,
    })));

    dispatch::broadcast_status(&state, &user, "online").await;

    tokio::spawn(write_ws(user.user_id, ws_tx, int_rx, state.clone()));
    tokio::spawn(listen_ws(user, conn_id, ws_rx, int_tx, state));
}

/// Single-writer task. Merges direct signals with the broadcast streams of
/// every room this connection joined; exits when the socket breaks or a
/// shutdown signal arrives. Dropping the stream map unsubscribes all rooms.
#[instrument(skip(websocket_tx, internal_rx, state), fields(user_id))]
pub async fn write_ws(
    user_id: i64,
    mut websocket_tx: SplitSink<WebSocket, Message>,
    mut internal_rx: UnboundedReceiver<SessionSignal>,
    state: Arc<AppState>,
) {
    info!("Write task started");

    let mut stream_map: StreamMap<i64, BroadcastStream<RoomEvent>> = StreamMap::new();

    'external: loop {
        tokio::select! {
            Some((chat_id, result)) = tokio_stream::StreamExt::next(&mut stream_map) => {
                match result {
                    Ok(room_event) => {
                        if room_event.exclude == Some(user_id) {
                            continue;
                        }
                        if send_event(&mut websocket_tx, &room_event.event).await.is_err() {
                            warn!(chat_id, "Failed to forward room event, closing connection");
                            break 'external;
                        }
                    }
                    Err(e) => {
                        // Lagged receiver: events were dropped. The client
                        // resyncs through the history endpoint on rejoin.
                        warn!(chat_id, error = %e, "Room stream lagged");
                    }
                }
            }

            signal = internal_rx.recv() => {
                match signal {
                    Some(SessionSignal::Deliver(event)) => {
                        if send_event(&mut websocket_tx, &event).await.is_err() {
                            warn!("Failed to deliver direct event, closing connection");
                            break 'external;
                        }
                    }
                    Some(SessionSignal::JoinRoom(chat_id)) => {
                        info!(chat_id, "Adding room subscription");
                        let rx = state.rooms.subscribe(chat_id);
                        stream_map.insert(chat_id, BroadcastStream::new(rx));
                    }
                    Some(SessionSignal::LeaveRoom(chat_id)) => {
                        info!(chat_id, "Removing room subscription");
                        stream_map.remove(&chat_id);
                    }
                    Some(SessionSignal::Shutdown) => {
                        info!("Shutdown signal received");
                        break 'external;
                    }
                    None => {
                        info!("Internal channel closed");
                        break 'external;
                    }
                }
            }
        }
    }

    info!("Write task terminated");
}

#[instrument(skip(websocket_tx, event))]
async fn send_event(
    websocket_tx: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).map_err(|e| {
        error!("Failed to serialize event: {:?}", e);
        axum::Error::new(e)
    })?;
    websocket_tx
        .send(Message::Text(Utf8Bytes::from(json)))
        .await
        .map_err(|e| {
            error!("Failed to send event through WebSocket: {:?}", e);
            e
        })
}

/// Reads client frames until close, error, or a silence timeout; the timeout
/// doubles as the liveness probe. Runs the cleanup sequence on exit.
#[instrument(skip(user, websocket_rx, internal_tx, state), fields(user_id = %user.user_id))]
pub async fn listen_ws(
    user: User,
    conn_id: ConnId,
    mut websocket_rx: SplitStream<WebSocket>,
    internal_tx: UnboundedSender<SessionSignal>,
    state: Arc<AppState>,
) {
    info!("Listen task started");

    let timeout_duration = Duration::from_secs(CLIENT_TIMEOUT_SECS);

    loop {
        match timeout(timeout_duration, StreamExt::next(&mut websocket_rx)).await {
            Ok(Some(msg_result)) => {
                let msg = match msg_result {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("WebSocket error: {:?}", e);
                        break;
                    }
                };

                match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => process_event(&state, &user, &internal_tx, event).await,
                        Err(e) => {
                            warn!(error = %e, "Unrecognized client event");
                            let _ = internal_tx.send(SessionSignal::Deliver(Arc::new(
                                ServerEvent::Error {
                                    message: "Unrecognized event".to_string(),
                                },
                            )));
                        }
                    },
                    Message::Close(_) => {
                        info!("Close message received");
                        break;
                    }
                    // Ping/pong handled by axum, binary frames ignored.
                    _ => {}
                }
            }
            Ok(None) => {
                info!("WebSocket stream ended");
                break;
            }
            Err(_) => {
                warn!(timeout_secs = CLIENT_TIMEOUT_SECS, "Connection timeout");
                break;
            }
        }
    }

    info!("Cleaning up connection");
    let _ = internal_tx.send(SessionSignal::Shutdown);

    // Offline transition is deferred by the grace period so a page reload
    // does not flap the contact status. The conn_id guard makes the delayed
    // unregister a no-op if the user reconnected in the meantime.
    let grace = state.presence_grace;
    tokio::spawn(async move {
        if !grace.is_zero() {
            sleep(grace).await;
        }
        if state.presence.unregister(user.user_id, conn_id) {
            dispatch::broadcast_status(&state, &user, "offline").await;
        }
    });

    info!("Listen task terminated");
}
