//! Application state shared by routes, middleware and session tasks.

use crate::repositories::{ChatRepository, MessageRepository, UserRepository};
use crate::ws::dispatch::{LogOnlyNotifier, PushNotifier};
use crate::ws::presence::{LocalPresence, PresenceRegistry};
use crate::ws::rooms::RoomMap;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

pub struct AppState {
    /// User directory lookups.
    pub user: UserRepository,

    /// Conversation store: conversations and memberships.
    pub chat: ChatRepository,

    /// Conversation store: message log, receipts, unread counters.
    pub msg: MessageRepository,

    /// Secret used to verify bearer credentials.
    pub jwt_secret: String,

    /// Who currently holds a live connection. Injected so the
    /// process-local map can be swapped for a shared-cache-backed
    /// implementation when scaling horizontally.
    pub presence: Arc<dyn PresenceRegistry>,

    /// Per-conversation broadcast channels for live fan-out.
    pub rooms: RoomMap,

    /// External push collaborator for offline recipients, best effort.
    pub notifier: Arc<dyn PushNotifier>,

    /// Delay before a disconnect flips presence to offline.
    pub presence_grace: Duration,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt_secret: String) -> Self {
        Self::with_collaborators(
            pool,
            jwt_secret,
            Arc::new(LocalPresence::new()),
            Arc::new(LogOnlyNotifier),
            Duration::from_secs(30),
        )
    }

    /// Full constructor with injectable collaborators; tests shorten the
    /// grace delay and production deployments may swap the presence
    /// registry or the push notifier.
    pub fn with_collaborators(
        pool: SqlitePool,
        jwt_secret: String,
        presence: Arc<dyn PresenceRegistry>,
        notifier: Arc<dyn PushNotifier>,
        presence_grace: Duration,
    ) -> Self {
        Self {
            user: UserRepository::new(pool.clone()),
            chat: ChatRepository::new(pool.clone()),
            msg: MessageRepository::new(pool),
            jwt_secret,
            presence,
            rooms: RoomMap::new(),
            notifier,
            presence_grace,
        }
    }
}
