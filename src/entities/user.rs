//! User entity - one row of the hospital user directory.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub user_id: i64,
    pub display_name: String,
    pub role: String,
    pub specialty: Option<String>,
}
