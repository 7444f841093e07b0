//! MessageRepository - message log, read receipts and unread bookkeeping.
//!
//! Every mutation that touches the log also rewrites the chat's
//! denormalized summary and the unread counters inside the same
//! transaction, so the three can never disagree (and a client that
//! disconnects mid-send observes either the whole append or nothing).

use super::Read;
use crate::entities::{DELETED_MESSAGE_PLACEHOLDER, Message, MessageType, ReadReceipt};
use chrono::{DateTime, Utc};
use sqlx::{Error, QueryBuilder, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

const MESSAGE_COLUMNS: &str = "message_id, chat_id, sender_id, sender_name, content, \
     message_type, file_url, file_name, is_edited, edited_at, created_at";

/// Input of [`MessageRepository::append`].
#[derive(Debug, Clone)]
pub struct NewMessageRecord {
    pub chat_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub content: String,
    pub message_type: MessageType,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ReadRow {
    message_id: i64,
    user_id: i64,
    read_at: DateTime<Utc>,
}

pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Appends a message: inserts the row, pre-seeds the sender's read
    /// receipt, rewrites the chat's last-message summary and increments
    /// every other participant's unread counter. One transaction; the
    /// counter bump is a store-level atomic increment, not a read-modify-
    /// write in process.
    #[instrument(skip(self, record), fields(chat_id = record.chat_id, sender_id = record.sender_id))]
    pub async fn append(&self, record: NewMessageRecord) -> Result<Message, Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let message_id = sqlx::query(
            "INSERT INTO messages \
                 (chat_id, sender_id, sender_name, content, message_type, \
                  file_url, file_name, is_edited, edited_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, NULL, ?)",
        )
        .bind(record.chat_id)
        .bind(record.sender_id)
        .bind(&record.sender_name)
        .bind(&record.content)
        .bind(record.message_type)
        .bind(&record.file_url)
        .bind(&record.file_name)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("INSERT INTO message_reads (message_id, user_id, read_at) VALUES (?, ?, ?)")
            .bind(message_id)
            .bind(record.sender_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE chats SET last_message_content = ?, last_message_sender_id = ?, \
                 last_message_at = ?, updated_at = ? \
             WHERE chat_id = ?",
        )
        .bind(&record.content)
        .bind(record.sender_id)
        .bind(now)
        .bind(now)
        .bind(record.chat_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE chat_participants SET unread_count = unread_count + 1 \
             WHERE chat_id = ? AND user_id != ?",
        )
        .bind(record.chat_id)
        .bind(record.sender_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(message_id, "Message appended");

        Ok(Message {
            message_id,
            chat_id: record.chat_id,
            sender_id: record.sender_id,
            sender_name: record.sender_name,
            content: record.content,
            message_type: record.message_type,
            file_url: record.file_url,
            file_name: record.file_name,
            is_edited: false,
            edited_at: None,
            created_at: now,
            read_by: vec![ReadReceipt {
                user_id: record.sender_id,
                read_at: now,
            }],
        })
    }

    /// Newest-first page over the append-ordered log, read receipts
    /// attached. Page 1 is the most recent `limit` messages; one extra row
    /// is fetched to compute `has_more`.
    #[instrument(skip(self), fields(chat_id = %chat_id, page, limit))]
    pub async fn find_page(
        &self,
        chat_id: i64,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<Message>, bool), Error> {
        let offset = (page.saturating_sub(1) as i64) * limit as i64;
        let mut messages = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE chat_id = ? ORDER BY message_id DESC LIMIT ? OFFSET ?"
        ))
        .bind(chat_id)
        .bind(limit as i64 + 1)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let has_more = messages.len() > limit as usize;
        messages.truncate(limit as usize);

        self.attach_receipts(&mut messages).await?;

        debug!(returned = messages.len(), has_more, "Message page loaded");
        Ok((messages, has_more))
    }

    async fn attach_receipts(&self, messages: &mut [Message]) -> Result<(), Error> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut query = QueryBuilder::new(
            "SELECT message_id, user_id, read_at FROM message_reads WHERE message_id IN (",
        );
        let mut separated = query.separated(", ");
        for message in messages.iter() {
            separated.push_bind(message.message_id);
        }
        query.push(")");

        let rows: Vec<ReadRow> = query.build_query_as().fetch_all(&self.pool).await?;

        let mut by_message: HashMap<i64, Vec<ReadReceipt>> = HashMap::new();
        for row in rows {
            by_message.entry(row.message_id).or_default().push(ReadReceipt {
                user_id: row.user_id,
                read_at: row.read_at,
            });
        }
        for message in messages.iter_mut() {
            message.read_by = by_message.remove(&message.message_id).unwrap_or_default();
        }
        Ok(())
    }

    /// Marks every foreign message of the chat as read by `user_id` and
    /// zeroes that participant's unread counter. Idempotent: receipts are
    /// inserted with OR IGNORE, so re-reading never duplicates them or
    /// touches other participants' counters.
    #[instrument(skip(self), fields(chat_id = %chat_id, user_id = %user_id))]
    pub async fn mark_read(&self, chat_id: i64, user_id: i64) -> Result<DateTime<Utc>, Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at) \
             SELECT message_id, ?, ? FROM messages WHERE chat_id = ? AND sender_id != ?",
        )
        .bind(user_id)
        .bind(now)
        .bind(chat_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE chat_participants SET unread_count = 0 WHERE chat_id = ? AND user_id = ?",
        )
        .bind(chat_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE chats SET updated_at = ? WHERE chat_id = ?")
            .bind(now)
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("Chat marked as read");
        Ok(now)
    }

    /// Soft delete: the row survives with the fixed placeholder content,
    /// terminal `Deleted` type and edit flags set. Sender gating happens in
    /// the caller, which has the loaded message at hand.
    #[instrument(skip(self), fields(message_id = %message_id))]
    pub async fn soft_delete(&self, message_id: i64, chat_id: i64) -> Result<DateTime<Utc>, Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE messages SET content = ?, message_type = 'DELETED', \
                 is_edited = 1, edited_at = ? \
             WHERE message_id = ?",
        )
        .bind(DELETED_MESSAGE_PLACEHOLDER)
        .bind(now)
        .bind(message_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE chats SET updated_at = ? WHERE chat_id = ?")
            .bind(now)
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Message soft-deleted");
        Ok(now)
    }
}

impl Read<Message, i64> for MessageRepository {
    #[instrument(skip(self), fields(message_id = %id))]
    async fn read(&self, id: &i64) -> Result<Option<Message>, Error> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE message_id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match message {
            Some(message) => {
                let mut messages = [message];
                self.attach_receipts(&mut messages).await?;
                let [message] = messages;
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }
}
