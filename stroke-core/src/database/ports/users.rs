use async_trait::async_trait;

use crate::{
    error::Result,
    types::{User, UserId},
};

#[async_trait]
pub trait UsersRepository: Send + Sync {
    /// Insert a user; a taken login is a `Conflict`.
    async fn create_user(&self, user: User) -> Result<User>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    async fn get_user_by_login(&self, login: &str) -> Result<Option<User>>;

    async fn count_users(&self) -> Result<i64>;
}
