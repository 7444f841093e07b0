//! User DTOs.

use crate::entities::User;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserDTO {
    pub user_id: i64,
    pub display_name: String,
    pub role: String,
    pub specialty: Option<String>,
}

impl From<User> for UserDTO {
    fn from(value: User) -> Self {
        Self {
            user_id: value.user_id,
            display_name: value.display_name,
            role: value.role,
            specialty: value.specialty,
        }
    }
}
