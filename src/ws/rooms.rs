//! Room map: one broadcast channel per conversation with at least one
//! subscribed connection.

use crate::dtos::ServerEvent;
use crate::ws::BROADCAST_CHANNEL_CAPACITY;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{Receiver, Sender, channel};
use tracing::{debug, info};

/// Event flowing through a room channel. `exclude` suppresses delivery to
/// one member's connections (the typist of a typing signal, the leaver of
/// a departure notice); events are shared by `Arc`, not cloned per
/// receiver.
#[derive(Clone)]
pub struct RoomEvent {
    pub exclude: Option<i64>,
    pub event: Arc<ServerEvent>,
}

pub struct RoomMap {
    channels: DashMap<i64, Sender<RoomEvent>>,
}

impl RoomMap {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribes to a room, creating its channel on first use. The entry
    /// API holds the key's shard lock across the lookup-or-create, so two
    /// connections joining an empty room never race each other into
    /// separate channels.
    pub fn subscribe(&self, chat_id: i64) -> Receiver<RoomEvent> {
        self.channels
            .entry(chat_id)
            .or_insert_with(|| {
                info!(chat_id, "Creating room channel");
                channel::<RoomEvent>(BROADCAST_CHANNEL_CAPACITY).0
            })
            .subscribe()
    }

    /// Best-effort delivery to every connection subscribed to the room:
    /// at most once per connection, no retry, no durability. Returns the
    /// number of receivers reached; a room with no listeners is torn down.
    pub fn send(&self, chat_id: i64, event: RoomEvent) -> usize {
        let Some(tx) = self.channels.get(&chat_id) else {
            debug!(chat_id, "No room channel, event dropped");
            return 0;
        };
        match tx.send(event) {
            Ok(receivers) => {
                debug!(chat_id, receivers, "Room event broadcast");
                receivers
            }
            Err(_) => {
                debug!(chat_id, "No active receivers, removing room channel");
                drop(tx);
                self.channels.remove(&chat_id);
                0
            }
        }
    }

    #[cfg(test)]
    pub fn room_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for RoomMap {
    fn default() -> Self {
        Self::new()
    }
}
