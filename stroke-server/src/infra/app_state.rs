use std::{fmt, sync::Arc};

use anyhow::{Context, anyhow};
use chrono::Duration;
use tracing::info;

use crate::infra::config::Config;
use stroke_core::{
    application::unit_of_work::CatalogUnitOfWork,
    artifacts::ArtifactAttachmentManager,
    assetstore::AssetStore,
    auth::AuthService,
    catalog::CatalogHierarchyManager,
    database::{MemoryStore, PostgresDatabase},
    settings::SettingsService,
    thumbnails::{
        ContainerRuntime, ContainerSubstrate, DockerCli, ExecutionSubstrate, JobRegistry,
        ThumbnailOrchestrator,
    },
    uploads::UploadService,
};

#[derive(Clone)]
pub struct AppState {
    pub unit_of_work: Arc<CatalogUnitOfWork>,
    pub postgres: Option<Arc<PostgresDatabase>>,
    pub config: Arc<Config>,
    pub assets: AssetStore,
    pub catalog: CatalogHierarchyManager,
    pub uploads: UploadService,
    pub thumbnails: ThumbnailOrchestrator,
    pub jobs: Arc<JobRegistry>,
    pub auth_service: AuthService,
    pub settings: SettingsService,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("unit_of_work", &self.unit_of_work)
            .field("jobs", &self.jobs)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Connect the configured store and run containers through the docker
    /// CLI.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let (unit_of_work, postgres) = match config.database_url.as_deref() {
            Some(url) => {
                let db = Arc::new(
                    PostgresDatabase::new(url)
                        .await
                        .context("failed to connect to PostgreSQL")?,
                );
                db.initialize_schema()
                    .await
                    .context("database migration failed")?;
                let uow = CatalogUnitOfWork::from_postgres(db.clone()).map_err(|e| anyhow!(e))?;
                info!("using PostgreSQL catalog store");
                (Arc::new(uow), Some(db))
            }
            None => {
                info!("DATABASE_URL not set; using in-memory catalog store");
                let uow = CatalogUnitOfWork::from_memory(Arc::new(MemoryStore::new()));
                (Arc::new(uow), None)
            }
        };

        let runtime = Arc::new(DockerCli::new(config.thumbnails.docker_path.clone()));
        let mut state = Self::from_parts(config, unit_of_work, runtime).await?;
        state.postgres = postgres;
        Ok(state)
    }

    /// Wire every service on top of a store and a container runtime.
    pub async fn from_parts(
        config: Config,
        unit_of_work: Arc<CatalogUnitOfWork>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> anyhow::Result<Self> {
        let assets = AssetStore::new(config.assetstore_dir.clone());
        assets
            .ensure_layout()
            .await
            .context("failed to prepare asset store")?;

        let attachments = ArtifactAttachmentManager::new(unit_of_work.clone(), assets.clone());
        let catalog =
            CatalogHierarchyManager::new(unit_of_work.clone(), assets.clone(), attachments.clone());
        let uploads = UploadService::new(unit_of_work.clone(), assets.clone(), attachments.clone());

        let jobs = Arc::new(JobRegistry::new());
        let substrate: Arc<dyn ExecutionSubstrate> = Arc::new(ContainerSubstrate::new(
            runtime,
            Arc::new(uploads.clone()),
            jobs.clone(),
            config.job_work_dir.clone(),
            config.thumbnails.max_concurrent_jobs,
        ));
        let thumbnails = ThumbnailOrchestrator::new(
            unit_of_work.clone(),
            assets.clone(),
            attachments,
            substrate,
            config.thumbnails.image.clone(),
        );

        let auth_service = AuthService::new(
            unit_of_work.clone(),
            Duration::days(config.session_ttl_days),
        );
        let settings = SettingsService::new(unit_of_work.clone());

        Ok(Self {
            unit_of_work,
            postgres: None,
            config: Arc::new(config),
            assets,
            catalog,
            uploads,
            thumbnails,
            jobs,
            auth_service,
            settings,
        })
    }
}
