//! UserRepository - read access to the hospital user directory.

use super::Read;
use crate::entities::User;
use sqlx::{Error, SqlitePool};
use tracing::{debug, instrument};

const SEARCH_RESULT_CAP: i64 = 20;

pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Case-insensitive substring search over display name and specialty,
    /// excluding the caller. Result size is capped.
    #[instrument(skip(self), fields(exclude = %exclude_user_id))]
    pub async fn search(&self, query: &str, exclude_user_id: i64) -> Result<Vec<User>, Error> {
        let pattern = format!("%{}%", escape_like(query));
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, display_name, role, specialty
            FROM users
            WHERE user_id != ?
              AND (display_name LIKE ? ESCAPE '\' OR specialty LIKE ? ESCAPE '\')
            ORDER BY display_name
            LIMIT ?
            "#,
        )
        .bind(exclude_user_id)
        .bind(&pattern)
        .bind(&pattern)
        .bind(SEARCH_RESULT_CAP)
        .fetch_all(&self.pool)
        .await?;

        debug!(found = users.len(), "Directory search completed");
        Ok(users)
    }
}

impl Read<User, i64> for UserRepository {
    #[instrument(skip(self), fields(user_id = %id))]
    async fn read(&self, id: &i64) -> Result<Option<User>, Error> {
        sqlx::query_as::<_, User>(
            "SELECT user_id, display_name, role, specialty FROM users WHERE user_id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }
}

/// Escapes LIKE wildcards so user input matches literally.
fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_escaping_neutralizes_wildcards() {
        assert_eq!(escape_like("100%_done"), "100\\%\\_done");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users")))]
    async fn search_excludes_caller(pool: SqlitePool) -> sqlx::Result<()> {
        let repo = UserRepository::new(pool);

        // "Dr." matches every fixture doctor; the caller must not be listed.
        let results = repo.search("Dr.", 1).await?;
        assert!(!results.is_empty());
        assert!(results.iter().all(|u| u.user_id != 1));

        Ok(())
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users")))]
    async fn search_matches_specialty(pool: SqlitePool) -> sqlx::Result<()> {
        let repo = UserRepository::new(pool);

        let results = repo.search("cardio", 999).await?;
        assert!(results.iter().any(|u| u.display_name == "Dr. Alice Adams"));

        Ok(())
    }
}
