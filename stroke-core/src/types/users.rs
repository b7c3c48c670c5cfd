use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::UserId;

/// Login reserved for the open-access guest account.
pub const GUEST_LOGIN: &str = "guest";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub login: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub admin: bool,
    pub created: DateTime<Utc>,
    /// Argon2 PHC string; never leaves the process
    #[serde(skip)]
    pub password_hash: Option<String>,
}

impl User {
    pub fn new(
        login: impl Into<String>,
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        admin: bool,
    ) -> Self {
        Self {
            id: UserId::new(),
            login: login.into().trim().to_lowercase(),
            email: email.into().trim().to_lowercase(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            admin,
            created: Utc::now(),
            password_hash: None,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.login == GUEST_LOGIN
    }
}

/// Capability carried by a session token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    DataRead,
    DataWrite,
}

impl TokenScope {
    pub fn all() -> Vec<TokenScope> {
        vec![TokenScope::DataRead, TokenScope::DataWrite]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenScope::DataRead => "data_read",
            TokenScope::DataWrite => "data_write",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "data_read" => Some(TokenScope::DataRead),
            "data_write" => Some(TokenScope::DataWrite),
            _ => None,
        }
    }
}

/// Persisted form of a session; only the token hash is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub token_hash: String,
    pub user_id: UserId,
    pub scopes: Vec<TokenScope>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn has_scope(&self, scope: TokenScope) -> bool {
        self.scopes.contains(&scope)
    }
}
