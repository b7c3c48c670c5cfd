//! PostgreSQL infrastructure adapters implementing the database ports.

pub mod repositories;

pub use repositories::collections::PostgresCollectionsRepository;
pub use repositories::files::PostgresFilesRepository;
pub use repositories::folders::PostgresFoldersRepository;
pub use repositories::items::PostgresItemsRepository;
pub use repositories::sessions::PostgresSessionsRepository;
pub use repositories::settings::PostgresSettingsRepository;
pub use repositories::users::PostgresUsersRepository;
