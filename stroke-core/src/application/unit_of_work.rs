use std::fmt;
use std::sync::Arc;

use crate::database::memory::MemoryStore;
#[cfg(feature = "database")]
use crate::database::postgres::PostgresDatabase;
use crate::database::ports::{
    collections::CollectionsRepository, files::FilesRepository, folders::FoldersRepository,
    items::ItemsRepository, sessions::SessionsRepository, settings::SettingsRepository,
    users::UsersRepository,
};

/// Aggregates all repository ports used by application services.
#[derive(Clone)]
pub struct CatalogUnitOfWork {
    pub users: Arc<dyn UsersRepository>,
    pub sessions: Arc<dyn SessionsRepository>,
    pub collections: Arc<dyn CollectionsRepository>,
    pub folders: Arc<dyn FoldersRepository>,
    pub items: Arc<dyn ItemsRepository>,
    pub files: Arc<dyn FilesRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    adapter: &'static str,
}

const CUSTOM_ADAPTER: &str = "custom";
const MEMORY_ADAPTER: &str = "MemoryStore";

impl CatalogUnitOfWork {
    /// Name of the storage adapter the ports were wired from.
    pub fn adapter(&self) -> &'static str {
        self.adapter
    }
}

impl fmt::Debug for CatalogUnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogUnitOfWork")
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct CatalogUnitOfWorkBuilder {
    users: Option<Arc<dyn UsersRepository>>,
    sessions: Option<Arc<dyn SessionsRepository>>,
    collections: Option<Arc<dyn CollectionsRepository>>,
    folders: Option<Arc<dyn FoldersRepository>>,
    items: Option<Arc<dyn ItemsRepository>>,
    files: Option<Arc<dyn FilesRepository>>,
    settings: Option<Arc<dyn SettingsRepository>>,
    adapter: Option<&'static str>,
}

impl fmt::Debug for CatalogUnitOfWorkBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogUnitOfWorkBuilder")
            .field("users", &self.users.is_some())
            .field("sessions", &self.sessions.is_some())
            .field("collections", &self.collections.is_some())
            .field("folders", &self.folders.is_some())
            .field("items", &self.items.is_some())
            .field("files", &self.files.is_some())
            .field("settings", &self.settings.is_some())
            .field("adapter", &self.adapter.unwrap_or(CUSTOM_ADAPTER))
            .finish()
    }
}

impl CatalogUnitOfWorkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(mut self, repo: Arc<dyn UsersRepository>) -> Self {
        self.users = Some(repo);
        self
    }
    pub fn with_sessions(mut self, repo: Arc<dyn SessionsRepository>) -> Self {
        self.sessions = Some(repo);
        self
    }
    pub fn with_collections(mut self, repo: Arc<dyn CollectionsRepository>) -> Self {
        self.collections = Some(repo);
        self
    }
    pub fn with_folders(mut self, repo: Arc<dyn FoldersRepository>) -> Self {
        self.folders = Some(repo);
        self
    }
    pub fn with_items(mut self, repo: Arc<dyn ItemsRepository>) -> Self {
        self.items = Some(repo);
        self
    }
    pub fn with_files(mut self, repo: Arc<dyn FilesRepository>) -> Self {
        self.files = Some(repo);
        self
    }
    pub fn with_settings(mut self, repo: Arc<dyn SettingsRepository>) -> Self {
        self.settings = Some(repo);
        self
    }

    /// Point every port at the same in-process store.
    pub fn with_memory(mut self, store: Arc<MemoryStore>) -> Self {
        self.adapter = Some(MEMORY_ADAPTER);
        self.with_users(store.clone())
            .with_sessions(store.clone())
            .with_collections(store.clone())
            .with_folders(store.clone())
            .with_items(store.clone())
            .with_files(store.clone())
            .with_settings(store)
    }

    /// Build a validated unit of work. Returns a string error naming the first
    /// missing repository.
    pub fn build(self) -> Result<CatalogUnitOfWork, String> {
        Ok(CatalogUnitOfWork {
            users: self
                .users
                .ok_or_else(|| "missing UsersRepository".to_string())?,
            sessions: self
                .sessions
                .ok_or_else(|| "missing SessionsRepository".to_string())?,
            collections: self
                .collections
                .ok_or_else(|| "missing CollectionsRepository".to_string())?,
            folders: self
                .folders
                .ok_or_else(|| "missing FoldersRepository".to_string())?,
            items: self
                .items
                .ok_or_else(|| "missing ItemsRepository".to_string())?,
            files: self
                .files
                .ok_or_else(|| "missing FilesRepository".to_string())?,
            settings: self
                .settings
                .ok_or_else(|| "missing SettingsRepository".to_string())?,
            adapter: self.adapter.unwrap_or(CUSTOM_ADAPTER),
        })
    }
}

impl CatalogUnitOfWork {
    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            sessions: store.clone(),
            collections: store.clone(),
            folders: store.clone(),
            items: store.clone(),
            files: store.clone(),
            settings: store,
            adapter: MEMORY_ADAPTER,
        }
    }
}

#[cfg(feature = "database")]
impl CatalogUnitOfWork {
    /// Convenience helper to compose all Postgres-backed repositories into a unit of work.
    pub fn from_postgres(db: Arc<PostgresDatabase>) -> Result<Self, String> {
        CatalogUnitOfWorkBuilder::new().with_postgres(db).build()
    }
}

#[cfg(feature = "database")]
impl CatalogUnitOfWorkBuilder {
    /// Populate the builder with Postgres-backed repository adapters.
    pub fn with_postgres(mut self, db: Arc<PostgresDatabase>) -> Self {
        self.adapter = Some("PostgresDatabase");
        self.with_users(Arc::new(db.users_repository().clone()))
            .with_sessions(Arc::new(db.sessions_repository().clone()))
            .with_collections(Arc::new(db.collections_repository().clone()))
            .with_folders(Arc::new(db.folders_repository().clone()))
            .with_items(Arc::new(db.items_repository().clone()))
            .with_files(Arc::new(db.files_repository().clone()))
            .with_settings(Arc::new(db.settings_repository().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_reports_missing_port() {
        let store = Arc::new(MemoryStore::new());
        let err = CatalogUnitOfWorkBuilder::new()
            .with_users(store.clone())
            .with_sessions(store)
            .build()
            .unwrap_err();
        assert_eq!(err, "missing CollectionsRepository");
    }

    #[test]
    fn debug_names_adapters() {
        let uow = CatalogUnitOfWork::from_memory(Arc::new(MemoryStore::new()));
        let rendered = format!("{uow:?}");
        assert!(rendered.contains("MemoryStore"));
        assert_eq!(uow.adapter(), "MemoryStore");
    }

    #[test]
    fn hand_wired_ports_report_custom_adapter() {
        let store = Arc::new(MemoryStore::new());
        let uow = CatalogUnitOfWorkBuilder::new()
            .with_users(store.clone())
            .with_sessions(store.clone())
            .with_collections(store.clone())
            .with_folders(store.clone())
            .with_items(store.clone())
            .with_files(store.clone())
            .with_settings(store)
            .build()
            .unwrap();
        assert_eq!(uow.adapter(), "custom");

        let memory = CatalogUnitOfWorkBuilder::new()
            .with_memory(Arc::new(MemoryStore::new()))
            .build()
            .unwrap();
        assert!(format!("{memory:?}").contains("MemoryStore"));
    }
}
