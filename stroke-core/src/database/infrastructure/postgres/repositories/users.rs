use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgRow};
use tracing::info;

use super::column;
use crate::database::ports::users::UsersRepository;
use crate::error::{CatalogError, Result};
use crate::types::{User, UserId};

const USER_COLUMNS: &str =
    "id, login, email, first_name, last_name, admin, password_hash, created";

/// PostgreSQL-backed implementation of the `UsersRepository` port.
#[derive(Clone, Debug)]
pub struct PostgresUsersRepository {
    pool: PgPool,
}

impl PostgresUsersRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_row(row: &PgRow) -> Result<User> {
        Ok(User {
            id: UserId(column(row, "id")?),
            login: column(row, "login")?,
            email: column(row, "email")?,
            first_name: column(row, "first_name")?,
            last_name: column(row, "last_name")?,
            admin: column(row, "admin")?,
            created: column(row, "created")?,
            password_hash: column(row, "password_hash")?,
        })
    }
}

#[async_trait]
impl UsersRepository for PostgresUsersRepository {
    async fn create_user(&self, user: User) -> Result<User> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, login, email, first_name, last_name, admin, password_hash, created
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.login)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.admin)
        .bind(&user.password_hash)
        .bind(user.created)
        .execute(self.pool())
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error()
                && db_err.constraint() == Some("users_login_key")
            {
                return CatalogError::Conflict(format!("login {} is already taken", user.login));
            }
            CatalogError::from(e)
        })?;

        info!("Created user: {} ({})", user.login, user.id);
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn get_user_by_login(&self, login: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE login = $1");
        let row = sqlx::query(&sql)
            .bind(login.trim().to_lowercase())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn count_users(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }
}
