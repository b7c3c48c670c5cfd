use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{error::Result, types::SessionRecord};

#[async_trait]
pub trait SessionsRepository: Send + Sync {
    async fn create_session(&self, session: SessionRecord) -> Result<()>;

    async fn get_session(&self, token_hash: &str) -> Result<Option<SessionRecord>>;

    async fn delete_session(&self, token_hash: &str) -> Result<bool>;

    /// Drop every session that expired before `now`; returns how many.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}
