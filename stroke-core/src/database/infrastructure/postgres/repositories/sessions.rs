use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, postgres::PgRow};

use super::column;
use crate::database::ports::sessions::SessionsRepository;
use crate::error::Result;
use crate::types::{SessionRecord, TokenScope, UserId};

#[derive(Debug, Clone)]
pub struct PostgresSessionsRepository {
    pool: PgPool,
}

impl PostgresSessionsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_row(row: &PgRow) -> Result<SessionRecord> {
        let scopes: Vec<String> = column(row, "scopes")?;
        Ok(SessionRecord {
            token_hash: column(row, "token_hash")?,
            user_id: UserId(column(row, "user_id")?),
            scopes: scopes.iter().filter_map(|s| TokenScope::parse(s)).collect(),
            created_at: column(row, "created_at")?,
            expires_at: column(row, "expires_at")?,
        })
    }
}

#[async_trait]
impl SessionsRepository for PostgresSessionsRepository {
    async fn create_session(&self, session: SessionRecord) -> Result<()> {
        let scopes: Vec<&str> = session.scopes.iter().map(|s| s.as_str()).collect();
        sqlx::query(
            r#"
            INSERT INTO sessions (token_hash, user_id, scopes, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&session.token_hash)
        .bind(session.user_id.as_uuid())
        .bind(scopes)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_session(&self, token_hash: &str) -> Result<Option<SessionRecord>> {
        let row = sqlx::query(
            r#"
            SELECT token_hash, user_id, scopes, created_at, expires_at
            FROM sessions
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
