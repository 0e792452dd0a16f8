use crate::types::enums::Role;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    /// Coin balance; never negative at any commit.
    pub balance: i64,
    pub active: bool,
    pub last_login: Option<i64>,
    pub created_at: i64,
}

impl Account {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
