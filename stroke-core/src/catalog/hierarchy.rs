use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument};

use crate::{
    application::unit_of_work::CatalogUnitOfWork,
    artifacts::ArtifactAttachmentManager,
    assetstore::AssetStore,
    database::ports::items::ItemFilter,
    error::{CatalogError, Result},
    types::{
        AccessLevel, CounterOutcome, Folder, FolderId, Item, ItemId, NewFolder, NewItem, Page,
        ParentType, SeriesSortField, Sort, StudyFields, StudySortField, User,
    },
};

use super::access::AccessGuard;

/// Input for [`CatalogHierarchyManager::create_study`].
#[derive(Debug, Clone)]
pub struct NewStudy {
    pub patient_id: String,
    pub study_date: DateTime<Utc>,
    pub modality: String,
    pub description: String,
    pub public: bool,
}

/// What an item removal did.
#[derive(Debug, Clone)]
pub struct RemovedItem {
    pub item: Item,
    pub files_removed: usize,
    /// Counter outcome on the parent study, for series items.
    pub series_count: Option<CounterOutcome>,
}

/// Studies and series, and the deletion pipeline that keeps their counters
/// and artifacts consistent.
#[derive(Clone)]
pub struct CatalogHierarchyManager {
    uow: Arc<CatalogUnitOfWork>,
    access: AccessGuard,
    assets: AssetStore,
    attachments: ArtifactAttachmentManager,
}

impl fmt::Debug for CatalogHierarchyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogHierarchyManager")
            .field("assets", &self.assets)
            .finish_non_exhaustive()
    }
}

impl CatalogHierarchyManager {
    pub fn new(
        uow: Arc<CatalogUnitOfWork>,
        assets: AssetStore,
        attachments: ArtifactAttachmentManager,
    ) -> Self {
        Self {
            access: AccessGuard::new(uow.clone()),
            uow,
            assets,
            attachments,
        }
    }

    pub fn access(&self) -> &AccessGuard {
        &self.access
    }

    pub async fn list_studies(
        &self,
        viewer: Option<&User>,
        sort: Sort<StudySortField>,
        page: Page,
    ) -> Result<Vec<Folder>> {
        self.uow.folders.list_studies(viewer, sort, page).await
    }

    /// Create a study folder under the caller's own user space, named after
    /// the patient id.
    #[instrument(skip(self, user, study), fields(user = %user.login))]
    pub async fn create_study(&self, user: &User, study: NewStudy) -> Result<Folder> {
        let patient_id = study.patient_id.trim();
        if patient_id.is_empty() {
            return Err(CatalogError::validation("patientId must not be empty"));
        }
        let modality = study.modality.trim();
        if modality.is_empty() {
            return Err(CatalogError::validation("modality must not be empty"));
        }

        let folder = self
            .uow
            .folders
            .create_folder(NewFolder {
                name: patient_id.to_string(),
                description: study.description,
                parent_id: user.id.as_uuid(),
                parent_collection: ParentType::User,
                creator_id: user.id,
                public: study.public,
                allow_rename: true,
                study: Some(StudyFields {
                    patient_id: patient_id.to_string(),
                    study_date: study.study_date,
                    study_modality: modality.to_string(),
                }),
            })
            .await?;

        info!(study = %folder.id, name = %folder.name, "created study");
        Ok(folder)
    }

    pub async fn list_series(
        &self,
        viewer: Option<&User>,
        study: FolderId,
        sort: Sort<SeriesSortField>,
        page: Page,
    ) -> Result<Vec<Item>> {
        let folder = self
            .access
            .require_folder(viewer, study, AccessLevel::Read)
            .await?;
        self.uow
            .items
            .list_child_items(folder.id, ItemFilter { series_only: true }, sort, page)
            .await
    }

    /// Create a series item in a study and bump the study's `nSeries`.
    #[instrument(skip(self, user), fields(user = %user.login))]
    pub async fn create_series(&self, user: &User, study: FolderId, name: &str) -> Result<Item> {
        let folder = self
            .access
            .require_folder(Some(user), study, AccessLevel::Write)
            .await?;
        if !folder.is_study {
            return Err(CatalogError::validation(format!(
                "folder {} is not a study",
                folder.id
            )));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::validation("series name must not be empty"));
        }

        let series = self
            .uow
            .items
            .create_item(NewItem {
                name: name.to_string(),
                description: String::new(),
                folder_id: folder.id,
                creator_id: user.id,
                is_series: true,
            })
            .await?;

        match self.uow.folders.adjust_series_count(folder.id, 1).await {
            Ok(CounterOutcome::Applied(n_series)) => {
                info!(series = %series.id, study = %folder.id, n_series, "created series");
            }
            Ok(outcome) => {
                error!(study = %folder.id, ?outcome, "nSeries increment was not applied");
            }
            Err(err) => {
                error!(study = %folder.id, error = %err, "failed to increment nSeries");
            }
        }

        Ok(series)
    }

    /// Delete an item with its own files, then run the removal
    /// post-conditions before returning.
    #[instrument(skip(self, user), fields(user = %user.login))]
    pub async fn remove_item(&self, user: &User, id: ItemId) -> Result<RemovedItem> {
        let (item, _) = self
            .access
            .require_item(Some(user), id, AccessLevel::Write)
            .await?;

        let mut files_removed = 0;
        for file in self.uow.files.list_item_files(item.id).await? {
            if self
                .assets
                .release_file(self.uow.files.as_ref(), file.id)
                .await?
                .is_some()
            {
                files_removed += 1;
            }
        }

        let Some(deleted) = self.uow.items.delete_item(item.id).await? else {
            return Err(CatalogError::not_found(format!("item {}", item.id)));
        };
        // uploads that landed after the listing went with the item row
        for file in &deleted.files {
            self.assets
                .release_blob(self.uow.files.as_ref(), &file.sha256)
                .await?;
        }
        files_removed += deleted.files.len();
        let removed = deleted.item;

        let series_count = self.attachments.handle_item_removed(&removed).await?;
        info!(item = %removed.id, files_removed, "removed item");

        Ok(RemovedItem {
            item: removed,
            files_removed,
            series_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ports::files::FilesRepository;
    use crate::testing::Fixture;
    use crate::types::{FileId, FileRecord, SortDirection};
    use async_trait::async_trait;

    /// Hides item files from listings, as if each upload finished right
    /// after a removal listed the item.
    struct LateUploads(Arc<dyn FilesRepository>);

    #[async_trait]
    impl FilesRepository for LateUploads {
        async fn create_file(&self, file: FileRecord) -> Result<FileRecord> {
            self.0.create_file(file).await
        }
        async fn get_file(&self, id: FileId) -> Result<Option<FileRecord>> {
            self.0.get_file(id).await
        }
        async fn save_file(&self, file: &FileRecord) -> Result<FileRecord> {
            self.0.save_file(file).await
        }
        async fn list_item_files(&self, _item: ItemId) -> Result<Vec<FileRecord>> {
            Ok(Vec::new())
        }
        async fn list_attached(&self, item: ItemId) -> Result<Vec<FileRecord>> {
            self.0.list_attached(item).await
        }
        async fn find_artifact(&self, item: ItemId, uid: &str) -> Result<Option<FileRecord>> {
            self.0.find_artifact(item, uid).await
        }
        async fn delete_file(&self, id: FileId) -> Result<Option<FileRecord>> {
            self.0.delete_file(id).await
        }
        async fn count_by_sha256(&self, sha256: &str) -> Result<i64> {
            self.0.count_by_sha256(sha256).await
        }
    }

    #[tokio::test]
    async fn study_round_trip_counts_series() {
        let fx = Fixture::new().await;
        let study = fx.study("P001").await;
        assert_eq!(study.n_series, 0);
        assert!(study.is_study);
        assert_eq!(study.study.as_ref().unwrap().study_modality, "CT");

        let series = fx
            .catalog
            .create_series(&fx.owner, study.id, "S1")
            .await
            .unwrap();
        assert!(series.is_series);
        assert_eq!(fx.folder(study.id).await.n_series, 1);

        let removed = fx.catalog.remove_item(&fx.owner, series.id).await.unwrap();
        assert_eq!(removed.series_count, Some(CounterOutcome::Applied(0)));
        assert_eq!(fx.folder(study.id).await.n_series, 0);
    }

    #[tokio::test]
    async fn counter_matches_series_after_mixed_sequence() {
        let fx = Fixture::new().await;
        let study = fx.study("P002").await;

        let mut created = Vec::new();
        for name in ["A", "B", "C", "D"] {
            created.push(fx.catalog.create_series(&fx.owner, study.id, name).await.unwrap());
        }
        fx.catalog.remove_item(&fx.owner, created[1].id).await.unwrap();
        fx.catalog.remove_item(&fx.owner, created[3].id).await.unwrap();
        fx.catalog.create_series(&fx.owner, study.id, "E").await.unwrap();

        let listed = fx
            .catalog
            .list_series(Some(&fx.owner), study.id, Sort::ascending(SeriesSortField::Name), Page::default())
            .await
            .unwrap();
        let names: Vec<_> = listed.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["A", "C", "E"]);
        assert_eq!(fx.folder(study.id).await.n_series, 3);
    }

    #[tokio::test]
    async fn concurrent_series_creation_keeps_count_exact() {
        let fx = Fixture::new().await;
        let study = fx.study("P003").await;

        let mut tasks = Vec::new();
        for i in 0..16 {
            let catalog = fx.catalog.clone();
            let owner = fx.owner.clone();
            tasks.push(tokio::spawn(async move {
                catalog.create_series(&owner, study.id, &format!("S{i}")).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(fx.folder(study.id).await.n_series, 16);
    }

    #[tokio::test]
    async fn colliding_patient_ids_are_renamed() {
        let fx = Fixture::new().await;
        let first = fx.study("P001").await;
        let second = fx.study("P001").await;
        assert_eq!(first.name, "P001");
        assert_eq!(second.name, "P001 (1)");
        assert_eq!(second.study.unwrap().patient_id, "P001");
    }

    #[tokio::test]
    async fn blank_patient_id_is_rejected() {
        let fx = Fixture::new().await;
        let err = fx
            .catalog
            .create_study(
                &fx.owner,
                NewStudy {
                    patient_id: "  ".into(),
                    study_date: Utc::now(),
                    modality: "MR".into(),
                    description: String::new(),
                    public: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[tokio::test]
    async fn anonymous_listing_sees_only_public_studies() {
        let fx = Fixture::new().await;
        fx.study("PRIVATE").await;
        let public = fx.public_study("PUBLIC").await;

        let anonymous = fx
            .catalog
            .list_studies(None, Sort::ascending(StudySortField::PatientId), Page::default())
            .await
            .unwrap();
        assert_eq!(anonymous.len(), 1);
        assert_eq!(anonymous[0].id, public.id);

        let owner_view = fx
            .catalog
            .list_studies(
                Some(&fx.owner),
                Sort {
                    field: StudySortField::PatientId,
                    direction: SortDirection::Descending,
                },
                Page::default(),
            )
            .await
            .unwrap();
        let names: Vec<_> = owner_view.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["PUBLIC", "PRIVATE"]);
    }

    #[tokio::test]
    async fn series_creation_requires_write_access() {
        let fx = Fixture::new().await;
        let study = fx.public_study("P001").await;
        let stranger = fx.user("stranger").await;

        let err = fx
            .catalog
            .create_series(&stranger, study.id, "S1")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::AccessDenied(_)));
        assert_eq!(fx.folder(study.id).await.n_series, 0);
    }

    #[tokio::test]
    async fn series_in_missing_study_is_not_found() {
        let fx = Fixture::new().await;
        let err = fx
            .catalog
            .create_series(&fx.owner, FolderId::new(), "S1")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn removal_takes_files_artifacts_and_blobs() {
        let fx = Fixture::new().await;
        let series = fx.series("S1").await;
        let (_, ordinary) = fx.upload(series.id, "scan.dcm", None).await;
        fx.artifacts(series.id, &["a.png"]).await;

        let removed = fx.catalog.remove_item(&fx.owner, series.id).await.unwrap();

        assert_eq!(removed.files_removed, 1);
        assert!(fx.uow.items.get_item(series.id).await.unwrap().is_none());
        assert!(fx.uow.files.list_attached(series.id).await.unwrap().is_empty());
        assert!(!fx.assets.exists(&ordinary.sha256).await.unwrap());
    }

    #[tokio::test]
    async fn removal_sweeps_files_uploaded_after_listing() {
        let fx = Fixture::new().await;
        let series = fx.series("S1").await;
        let (_, late) = fx.upload(series.id, "late.dcm", None).await;

        let mut uow = (*fx.uow).clone();
        uow.files = Arc::new(LateUploads(fx.uow.files.clone()));
        let catalog =
            CatalogHierarchyManager::new(Arc::new(uow), fx.assets.clone(), fx.attachments.clone());

        let removed = catalog.remove_item(&fx.owner, series.id).await.unwrap();

        assert_eq!(removed.files_removed, 1);
        assert!(fx.uow.files.get_file(late.id).await.unwrap().is_none());
        assert!(!fx.assets.exists(&late.sha256).await.unwrap());
    }
}
