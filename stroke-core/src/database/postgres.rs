use crate::{
    database::infrastructure::postgres::repositories::{
        collections::PostgresCollectionsRepository, files::PostgresFilesRepository,
        folders::PostgresFoldersRepository, items::PostgresItemsRepository,
        sessions::PostgresSessionsRepository, settings::PostgresSettingsRepository,
        users::PostgresUsersRepository,
    },
    error::{CatalogError, Result},
};
use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
};
use std::{fmt, path::Path, time::Duration};
use tracing::{debug, info};

/// Statistics about the connection pool
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub size: u32,
    pub idle: u32,
    pub max_size: u32,
    pub min_idle: u32,
}

#[derive(Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
    max_connections: u32,
    min_connections: u32,
    users: PostgresUsersRepository,
    sessions: PostgresSessionsRepository,
    collections: PostgresCollectionsRepository,
    folders: PostgresFoldersRepository,
    items: PostgresItemsRepository,
    files: PostgresFilesRepository,
    settings: PostgresSettingsRepository,
}

impl fmt::Debug for PostgresDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresDatabase")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .finish()
    }
}

impl PostgresDatabase {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(10);

        let min_connections = std::env::var("DB_MIN_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(1);

        let connect_options = Self::build_connect_options(connection_string)?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .max_lifetime(Duration::from_secs(1800))
            .idle_timeout(Duration::from_secs(600))
            .test_before_acquire(true)
            .connect_with(connect_options)
            .await
            .map_err(|e| CatalogError::Database(format!("Database connection failed: {e}")))?;

        info!(
            "Database pool initialized with max_connections={}, min_connections={}",
            max_connections, min_connections
        );

        let mut database = Self::from_pool(pool);
        database.max_connections = max_connections;
        database.min_connections = min_connections;
        Ok(database)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            users: PostgresUsersRepository::new(pool.clone()),
            sessions: PostgresSessionsRepository::new(pool.clone()),
            collections: PostgresCollectionsRepository::new(pool.clone()),
            folders: PostgresFoldersRepository::new(pool.clone()),
            items: PostgresItemsRepository::new(pool.clone()),
            files: PostgresFilesRepository::new(pool.clone()),
            settings: PostgresSettingsRepository::new(pool.clone()),
            max_connections: pool.options().get_max_connections(),
            min_connections: pool.options().get_min_connections(),
            pool,
        }
    }

    fn build_connect_options(connection_string: &str) -> Result<PgConnectOptions> {
        let trimmed = connection_string.trim();

        let mut options = if trimmed.is_empty() {
            PgConnectOptions::new()
        } else {
            trimmed.parse::<PgConnectOptions>().map_err(|e| {
                CatalogError::Validation(format!("Invalid PostgreSQL connection string: {e}"))
            })?
        };

        if let Ok(password) = std::env::var("PGPASSWORD")
            && !password.is_empty()
        {
            options = options.password(&password);
        }

        if let Ok(socket_dir) = std::env::var("PG_SOCKET_DIR")
            && !socket_dir.is_empty()
        {
            options = options.socket(Path::new(&socket_dir));
            debug!("Using PostgreSQL socket from PG_SOCKET_DIR at {}", socket_dir);
            if std::env::var("PGSSLMODE").is_err() {
                options = options.ssl_mode(PgSslMode::Disable);
            }
        }

        Ok(options)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn users_repository(&self) -> &PostgresUsersRepository {
        &self.users
    }

    pub(crate) fn sessions_repository(&self) -> &PostgresSessionsRepository {
        &self.sessions
    }

    pub(crate) fn collections_repository(&self) -> &PostgresCollectionsRepository {
        &self.collections
    }

    pub(crate) fn folders_repository(&self) -> &PostgresFoldersRepository {
        &self.folders
    }

    pub(crate) fn items_repository(&self) -> &PostgresItemsRepository {
        &self.items
    }

    pub(crate) fn files_repository(&self) -> &PostgresFilesRepository {
        &self.files
    }

    pub(crate) fn settings_repository(&self) -> &PostgresSettingsRepository {
        &self.settings
    }

    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle() as u32,
            max_size: self.max_connections,
            min_idle: self.min_connections,
        }
    }

    /// Apply the embedded migrations.
    pub async fn initialize_schema(&self) -> Result<()> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CatalogError::Database(format!("Migration failed: {e}")))?;
        info!("Database migrations complete");
        Ok(())
    }
}
