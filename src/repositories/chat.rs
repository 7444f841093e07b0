//! ChatRepository - conversations and memberships.

use super::Read;
use crate::entities::{Chat, ChatKind, ChatParticipant};
use chrono::{DateTime, Utc};
use sqlx::{Error, SqlitePool};
use tracing::{debug, info, instrument};

const CHAT_COLUMNS: &str = "chat_id, chat_kind, is_active, created_at, updated_at, \
     last_message_content, last_message_sender_id, last_message_at";

/// Row of the conversation listing: the chat seen from one participant's
/// side, joined with the partner's membership row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatSummaryRow {
    pub chat_id: i64,
    pub chat_kind: ChatKind,
    pub updated_at: DateTime<Utc>,
    pub last_message_content: Option<String>,
    pub last_message_sender_id: Option<i64>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i64,
    pub partner_id: i64,
    pub partner_name: String,
}

pub struct ChatRepository {
    pool: SqlitePool,
}

impl ChatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Canonical key of an unordered participant pair.
    fn pair_key(a: i64, b: i64) -> String {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        format!("{lo}:{hi}")
    }

    async fn find_by_pair_key(&self, pair_key: &str) -> Result<Option<Chat>, Error> {
        sqlx::query_as::<_, Chat>(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats WHERE pair_key = ?"
        ))
        .bind(pair_key)
        .fetch_optional(&self.pool)
        .await
    }

    /// Returns the direct conversation for the unordered pair, creating it
    /// (with both memberships and zeroed unread counters) if absent.
    ///
    /// Idempotent and race-safe: concurrent calls for the same pair contend
    /// on the store's unique `pair_key` index, and the loser re-fetches the
    /// winner's row. Callers validate `a != b` upstream.
    ///
    /// The boolean in the result is `true` when the chat was just created.
    #[instrument(skip(self, a, b), fields(user_a = a.0, user_b = b.0))]
    pub async fn find_or_create_direct(
        &self,
        a: (i64, &str),
        b: (i64, &str),
    ) -> Result<(Chat, bool), Error> {
        let pair_key = Self::pair_key(a.0, b.0);

        if let Some(chat) = self.find_by_pair_key(&pair_key).await? {
            debug!(chat_id = chat.chat_id, "Direct chat already exists");
            return Ok((chat, false));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO chats (chat_kind, pair_key, is_active, created_at, updated_at) \
             VALUES ('DIRECT', ?, 1, ?, ?)",
        )
        .bind(&pair_key)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await;

        let chat_id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(Error::Database(db_err)) if db_err.is_unique_violation() => {
                // Lost the creation race; the winner's row is authoritative.
                drop(tx);
                debug!("Concurrent creation detected, fetching existing chat");
                let chat = self
                    .find_by_pair_key(&pair_key)
                    .await?
                    .ok_or(Error::RowNotFound)?;
                return Ok((chat, false));
            }
            Err(e) => return Err(e),
        };

        for (user_id, display_name) in [a, b] {
            sqlx::query(
                "INSERT INTO chat_participants (chat_id, user_id, display_name, unread_count) \
                 VALUES (?, ?, ?, 0)",
            )
            .bind(chat_id)
            .bind(user_id)
            .bind(display_name)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(chat_id, "Direct chat created");

        Ok((
            Chat {
                chat_id,
                chat_kind: ChatKind::Direct,
                is_active: true,
                created_at: now,
                updated_at: now,
                last_message_content: None,
                last_message_sender_id: None,
                last_message_at: None,
            },
            true,
        ))
    }

    /// Loads a chat together with its membership rows.
    #[instrument(skip(self), fields(chat_id = %chat_id))]
    pub async fn read_with_participants(
        &self,
        chat_id: &i64,
    ) -> Result<Option<(Chat, Vec<ChatParticipant>)>, Error> {
        let Some(chat) = self.read(chat_id).await? else {
            return Ok(None);
        };

        let participants = sqlx::query_as::<_, ChatParticipant>(
            "SELECT chat_id, user_id, display_name, unread_count \
             FROM chat_participants WHERE chat_id = ? ORDER BY user_id",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some((chat, participants)))
    }

    /// Active conversations of a user, most recently active first.
    /// Fetches one row beyond the page to compute `has_more`.
    #[instrument(skip(self), fields(user_id = %user_id, page, limit))]
    pub async fn list_for_user(
        &self,
        user_id: i64,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<ChatSummaryRow>, bool), Error> {
        let offset = (page.saturating_sub(1) as i64) * limit as i64;
        let mut rows = sqlx::query_as::<_, ChatSummaryRow>(
            r#"
            SELECT
                c.chat_id,
                c.chat_kind,
                c.updated_at,
                c.last_message_content,
                c.last_message_sender_id,
                c.last_message_at,
                me.unread_count,
                other.user_id AS partner_id,
                other.display_name AS partner_name
            FROM chats c
            INNER JOIN chat_participants me
                ON me.chat_id = c.chat_id AND me.user_id = ?
            INNER JOIN chat_participants other
                ON other.chat_id = c.chat_id AND other.user_id != ?
            WHERE c.is_active = 1 AND c.chat_kind = 'DIRECT'
            ORDER BY COALESCE(c.last_message_at, c.created_at) DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(limit as i64 + 1)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let has_more = rows.len() > limit as usize;
        rows.truncate(limit as usize);

        debug!(returned = rows.len(), has_more, "Conversation page loaded");
        Ok((rows, has_more))
    }

    /// Per-chat unread counters of a user (only non-zero entries).
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn unread_counts(&self, user_id: i64) -> Result<Vec<(i64, i64)>, Error> {
        sqlx::query_as::<_, (i64, i64)>(
            "SELECT cp.chat_id, cp.unread_count \
             FROM chat_participants cp \
             INNER JOIN chats c ON c.chat_id = cp.chat_id \
             WHERE cp.user_id = ? AND cp.unread_count > 0 AND c.is_active = 1 \
             ORDER BY cp.chat_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Membership probe used by the ephemeral event handlers that do not
    /// need the full chat loaded.
    #[instrument(skip(self), fields(chat_id = %chat_id, user_id = %user_id))]
    pub async fn is_participant(&self, chat_id: i64, user_id: i64) -> Result<bool, Error> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM chat_participants WHERE chat_id = ? AND user_id = ?",
        )
        .bind(chat_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    /// Ids of every user sharing a direct chat with `user_id`. Used to fan
    /// presence transitions out to contacts.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn partner_ids(&self, user_id: i64) -> Result<Vec<i64>, Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT DISTINCT other.user_id \
             FROM chat_participants me \
             INNER JOIN chat_participants other \
                 ON other.chat_id = me.chat_id AND other.user_id != me.user_id \
             WHERE me.user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}

impl Read<Chat, i64> for ChatRepository {
    #[instrument(skip(self), fields(chat_id = %id))]
    async fn read(&self, id: &i64) -> Result<Option<Chat>, Error> {
        sqlx::query_as::<_, Chat>(&format!("SELECT {CHAT_COLUMNS} FROM chats WHERE chat_id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users")))]
    async fn find_or_create_is_idempotent(pool: SqlitePool) -> sqlx::Result<()> {
        let repo = ChatRepository::new(pool);

        let (first, created) = repo
            .find_or_create_direct((1, "Dr. Alice Adams"), (2, "Dr. Bob Brown"))
            .await?;
        assert!(created);

        let (second, created_again) = repo
            .find_or_create_direct((1, "Dr. Alice Adams"), (2, "Dr. Bob Brown"))
            .await?;
        assert!(!created_again);
        assert_eq!(first.chat_id, second.chat_id);

        Ok(())
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users")))]
    async fn find_or_create_ignores_argument_order(pool: SqlitePool) -> sqlx::Result<()> {
        let repo = ChatRepository::new(pool);

        let (ab, _) = repo
            .find_or_create_direct((1, "Dr. Alice Adams"), (2, "Dr. Bob Brown"))
            .await?;
        let (ba, created) = repo
            .find_or_create_direct((2, "Dr. Bob Brown"), (1, "Dr. Alice Adams"))
            .await?;

        assert!(!created);
        assert_eq!(ab.chat_id, ba.chat_id);

        Ok(())
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users")))]
    async fn concurrent_find_or_create_yields_one_chat(pool: SqlitePool) -> sqlx::Result<()> {
        let repo = Arc::new(ChatRepository::new(pool.clone()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                // Alternate argument order across tasks.
                if i % 2 == 0 {
                    repo.find_or_create_direct((1, "Dr. Alice Adams"), (2, "Dr. Bob Brown"))
                        .await
                } else {
                    repo.find_or_create_direct((2, "Dr. Bob Brown"), (1, "Dr. Alice Adams"))
                        .await
                }
            }));
        }

        let mut chat_ids = Vec::new();
        for handle in handles {
            let (chat, _) = handle.await.expect("task completes")?;
            chat_ids.push(chat.chat_id);
        }
        chat_ids.dedup();
        assert_eq!(chat_ids.len(), 1, "all callers must converge on one chat");

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chats")
            .fetch_one(&pool)
            .await?;
        assert_eq!(total, 1);

        Ok(())
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users", "chats")))]
    async fn list_orders_by_recent_activity(pool: SqlitePool) -> sqlx::Result<()> {
        let repo = ChatRepository::new(pool);

        let (rows, has_more) = repo.list_for_user(1, 1, 50).await?;
        assert!(!has_more);
        assert_eq!(rows.len(), 2, "Alice has two active chats in fixtures");
        // Chat 1 (with Bob) carries the most recent message.
        assert_eq!(rows[0].chat_id, 1);
        assert_eq!(rows[0].partner_id, 2);
        assert_eq!(rows[1].chat_id, 2);

        Ok(())
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users", "chats")))]
    async fn list_skips_archived_chats(pool: SqlitePool) -> sqlx::Result<()> {
        let repo = ChatRepository::new(pool.clone());

        sqlx::query("UPDATE chats SET is_active = 0 WHERE chat_id = 1")
            .execute(&pool)
            .await?;

        let (rows, _) = repo.list_for_user(1, 1, 50).await?;
        assert!(rows.iter().all(|r| r.chat_id != 1));

        Ok(())
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users", "chats")))]
    async fn partner_ids_cover_every_shared_chat(pool: SqlitePool) -> sqlx::Result<()> {
        let repo = ChatRepository::new(pool);

        let mut partners = repo.partner_ids(1).await?;
        partners.sort_unstable();
        assert_eq!(partners, vec![2, 3]);

        Ok(())
    }
}
