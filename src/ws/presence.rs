//! Presence registry: who currently holds a live connection.
//!
//! Process-local; presence is rebuilt empty on restart and is
//! only correct within one server process. The trait seam exists so a
//! shared-cache-backed implementation can replace [`LocalPresence`] for
//! horizontal scaling without touching the session manager.

use crate::dtos::ServerEvent;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

/// Process-unique connection identifier, used to guard a stale unregister
/// against a fresh reconnect.
pub type ConnId = u64;

static CONN_COUNTER: AtomicU64 = AtomicU64::new(1);

pub fn next_conn_id() -> ConnId {
    CONN_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Control messages for a connection's write task.
pub enum SessionSignal {
    /// Deliver one event directly to this connection.
    Deliver(Arc<ServerEvent>),
    /// Subscribe the connection to a room's broadcast channel.
    JoinRoom(i64),
    /// Drop the room subscription.
    LeaveRoom(i64),
    /// Close the write task.
    Shutdown,
}

struct PresenceEntry {
    conn_id: ConnId,
    tx: UnboundedSender<SessionSignal>,
}

pub trait PresenceRegistry: Send + Sync {
    /// Records `conn_id` as the user's active connection, overwriting any
    /// prior entry: only the newest connection counts as "the" active one
    /// (multi-device fan-out is not guaranteed).
    fn register(&self, user_id: i64, conn_id: ConnId, tx: UnboundedSender<SessionSignal>);

    /// Removes the entry only if it still points at `conn_id`, so an
    /// unregister delayed by the grace period cannot clobber a reconnect.
    /// Returns whether the user actually went offline.
    fn unregister(&self, user_id: i64, conn_id: ConnId) -> bool;

    fn is_online(&self, user_id: i64) -> bool;

    /// Signal channel of the user's active connection, if any.
    fn session_of(&self, user_id: i64) -> Option<UnboundedSender<SessionSignal>>;

    /// When the user was last connected; `None` if never seen or online.
    fn last_seen(&self, user_id: i64) -> Option<DateTime<Utc>>;

    fn online_count(&self) -> usize;
}

/// In-memory, single-process implementation.
pub struct LocalPresence {
    online: DashMap<i64, PresenceEntry>,
    last_seen: DashMap<i64, DateTime<Utc>>,
}

impl LocalPresence {
    pub fn new() -> Self {
        Self {
            online: DashMap::new(),
            last_seen: DashMap::new(),
        }
    }
}

impl Default for LocalPresence {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRegistry for LocalPresence {
    fn register(&self, user_id: i64, conn_id: ConnId, tx: UnboundedSender<SessionSignal>) {
        self.online.insert(user_id, PresenceEntry { conn_id, tx });
        self.last_seen.remove(&user_id);
        info!(user_id, conn_id, total_online = self.online.len(), "User registered as online");
    }

    fn unregister(&self, user_id: i64, conn_id: ConnId) -> bool {
        let removed = self
            .online
            .remove_if(&user_id, |_, entry| entry.conn_id == conn_id)
            .is_some();
        if removed {
            self.last_seen.insert(user_id, Utc::now());
            info!(user_id, conn_id, "User went offline");
        } else {
            debug!(user_id, conn_id, "Stale unregister ignored");
        }
        removed
    }

    fn is_online(&self, user_id: i64) -> bool {
        self.online.contains_key(&user_id)
    }

    fn session_of(&self, user_id: i64) -> Option<UnboundedSender<SessionSignal>> {
        self.online.get(&user_id).map(|entry| entry.tx.clone())
    }

    fn last_seen(&self, user_id: i64) -> Option<DateTime<Utc>> {
        self.last_seen.get(&user_id).map(|seen| *seen)
    }

    fn online_count(&self) -> usize {
        self.online.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn newest_connection_wins() {
        let presence = LocalPresence::new();
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();

        presence.register(7, 1, tx1);
        presence.register(7, 2, tx2);

        assert!(presence.is_online(7));
        assert_eq!(presence.online_count(), 1);

        // Signals go to the newest connection only.
        let tx = presence.session_of(7).expect("user online");
        tx.send(SessionSignal::Shutdown).expect("send works");
        assert!(rx2.try_recv().is_ok());
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn stale_unregister_is_a_noop() {
        let presence = LocalPresence::new();
        let (tx1, _rx1) = unbounded_channel();
        let (tx2, _rx2) = unbounded_channel();

        presence.register(7, 1, tx1);
        presence.register(7, 2, tx2);

        // conn 1 disconnects after the reconnect already took over.
        assert!(!presence.unregister(7, 1));
        assert!(presence.is_online(7), "fresh connection must survive");
        assert!(presence.last_seen(7).is_none());

        assert!(presence.unregister(7, 2));
        assert!(!presence.is_online(7));
        assert!(presence.last_seen(7).is_some());
    }
}
