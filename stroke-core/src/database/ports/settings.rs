use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<Option<Value>>;

    async fn set_setting(&self, key: &str, value: Value) -> Result<()>;

    async fn unset_setting(&self, key: &str) -> Result<()>;
}
