use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::{
    application::unit_of_work::CatalogUnitOfWork,
    assetstore::AssetStore,
    error::{CatalogError, Result},
    types::{AttachmentType, CounterOutcome, FileRecord, Item, ItemId, Upload},
};

use super::reference::requests_interactive_thumbnail;

/// Keeps artifact files attached to their item and the item's
/// `hasInteractiveThumbnail` flag in step with them.
#[derive(Clone)]
pub struct ArtifactAttachmentManager {
    uow: Arc<CatalogUnitOfWork>,
    assets: AssetStore,
}

impl fmt::Debug for ArtifactAttachmentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactAttachmentManager")
            .field("assets", &self.assets)
            .finish()
    }
}

impl ArtifactAttachmentManager {
    pub fn new(uow: Arc<CatalogUnitOfWork>, assets: AssetStore) -> Self {
        Self { uow, assets }
    }

    /// Called once an upload has produced its file record. Uploads whose
    /// reference carries the thumbnail marker are moved off item ownership
    /// and attached to the item directly. Anything else is returned as is.
    ///
    /// Replaying the same finalization leaves the store unchanged.
    pub async fn handle_upload_finalized(
        &self,
        upload: &Upload,
        file: FileRecord,
    ) -> Result<FileRecord> {
        if !requests_interactive_thumbnail(upload.reference.as_deref()) {
            return Ok(file);
        }

        // Work from the stored record; a replay may carry a stale snapshot.
        let mut current = self
            .uow
            .files
            .get_file(file.id)
            .await?
            .ok_or_else(|| CatalogError::not_found(format!("file {}", file.id)))?;

        let item_id = Self::target_item(&current)
            .ok_or_else(|| CatalogError::not_found(format!("item for file {}", current.id)))?;
        let item = self
            .uow
            .items
            .get_item(item_id)
            .await?
            .ok_or_else(|| CatalogError::not_found(format!("item {item_id}")))?;

        let already_attached = current.item_id.is_none()
            && current.is_attached_to_item(item.id)
            && current.interactive_thumbnails_uid.as_deref() == Some(current.name.as_str());

        if already_attached {
            debug!(file = %current.id, item = %item.id, "artifact already attached");
        } else {
            current.reparent_as_artifact(item.id);
            current = self.uow.files.save_file(&current).await?;
            info!(
                file = %current.id,
                item = %item.id,
                uid = %current.name,
                "attached thumbnail artifact"
            );
        }

        if !item.has_interactive_thumbnail {
            self.uow.items.set_thumbnail_flag(item.id, true).await?;
        }

        Ok(current)
    }

    fn target_item(file: &FileRecord) -> Option<ItemId> {
        file.item_id.or_else(|| match file.attached_to_type {
            Some(AttachmentType::Item) => file.attached_to_id.map(ItemId::from),
            None => None,
        })
    }

    /// Remove every artifact attached to `item`. Ordinary files are left
    /// alone. With `update_flag` the item's thumbnail flag is cleared
    /// afterwards. Returns the number of artifacts removed.
    pub async fn purge_artifacts(&self, item: ItemId, update_flag: bool) -> Result<usize> {
        let attached = self.uow.files.list_attached(item).await?;
        let mut removed = 0;
        for file in attached.into_iter().filter(FileRecord::is_artifact) {
            if self
                .assets
                .release_file(self.uow.files.as_ref(), file.id)
                .await?
                .is_some()
            {
                removed += 1;
            }
        }

        if update_flag && !self.uow.items.set_thumbnail_flag(item, false).await? {
            debug!(item = %item, "thumbnail flag not cleared, item is gone");
        }

        if removed > 0 {
            info!(item = %item, removed, "purged thumbnail artifacts");
        }
        Ok(removed)
    }

    /// Post-conditions of an item removal: the parent study's series counter
    /// and the removed item's artifacts. Returns the counter outcome for
    /// series items.
    pub async fn handle_item_removed(&self, item: &Item) -> Result<Option<CounterOutcome>> {
        let outcome = if item.is_series {
            let outcome = self
                .uow
                .folders
                .adjust_series_count(item.folder_id, -1)
                .await?;
            match outcome {
                CounterOutcome::Applied(n_series) => {
                    debug!(folder = %item.folder_id, n_series, "decremented series count");
                }
                CounterOutcome::Underflow => {
                    error!(
                        folder = %item.folder_id,
                        item = %item.id,
                        "refusing to decrement nSeries below zero"
                    );
                }
                CounterOutcome::Missing => {
                    warn!(folder = %item.folder_id, "parent folder vanished before decrement");
                }
            }
            Some(outcome)
        } else {
            None
        };

        self.purge_artifacts(item.id, false).await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use crate::types::{FolderId, NewItem};

    #[tokio::test]
    async fn marked_upload_is_reparented_and_flags_item() {
        let fx = Fixture::new().await;
        let series = fx.series("S1").await;

        let (upload, file) = fx.upload(series.id, "slice_0.png", Some(r#"{"interactive_thumbnail": true}"#)).await;
        let attached = fx.attachments.handle_upload_finalized(&upload, file).await.unwrap();

        assert_eq!(attached.item_id, None);
        assert!(attached.is_attached_to_item(series.id));
        assert_eq!(attached.interactive_thumbnails_uid.as_deref(), Some("slice_0.png"));
        assert!(fx.item(series.id).await.has_interactive_thumbnail);
    }

    #[tokio::test]
    async fn unmarked_upload_is_left_alone() {
        let fx = Fixture::new().await;
        let series = fx.series("S1").await;

        for reference in [None, Some("garbage"), Some("[1,2]"), Some(r#"{"other": 1}"#)] {
            let (upload, file) = fx.upload(series.id, "scan.dcm", reference).await;
            let result = fx.attachments.handle_upload_finalized(&upload, file.clone()).await.unwrap();
            assert_eq!(result, file);
        }
        assert!(!fx.item(series.id).await.has_interactive_thumbnail);
        assert!(fx.uow.files.list_attached(series.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replaying_finalization_is_a_no_op() {
        let fx = Fixture::new().await;
        let series = fx.series("S1").await;
        let (upload, file) = fx.upload(series.id, "slice_0.png", Some(r#"{"interactive_thumbnail": 1}"#)).await;

        let first = fx.attachments.handle_upload_finalized(&upload, file.clone()).await.unwrap();
        let second = fx.attachments.handle_upload_finalized(&upload, file).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fx.uow.files.list_attached(series.id).await.unwrap().len(), 1);
        assert!(fx.uow.files.list_item_files(series.id).await.unwrap().is_empty());
        assert!(fx.item(series.id).await.has_interactive_thumbnail);
    }

    #[tokio::test]
    async fn missing_target_item_is_not_found() {
        let fx = Fixture::new().await;
        let series = fx.series("S1").await;
        let (upload, file) = fx.upload(series.id, "slice_0.png", Some(r#"{"interactive_thumbnail": true}"#)).await;

        // Drop the item row; the upload's record goes with it.
        fx.uow.items.delete_item(series.id).await.unwrap();

        let err = fx.attachments.handle_upload_finalized(&upload, file).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn purge_removes_artifacts_and_keeps_ordinary_files() {
        let fx = Fixture::new().await;
        let series = fx.series("S1").await;
        fx.upload(series.id, "scan.dcm", None).await;
        fx.artifacts(series.id, &["a.png", "b.png"]).await;

        let removed = fx.attachments.purge_artifacts(series.id, true).await.unwrap();

        assert_eq!(removed, 2);
        assert!(fx.uow.files.list_attached(series.id).await.unwrap().is_empty());
        let ordinary = fx.uow.files.list_item_files(series.id).await.unwrap();
        assert_eq!(ordinary.len(), 1);
        assert_eq!(ordinary[0].name, "scan.dcm");
        assert!(fx.assets.exists(&ordinary[0].sha256).await.unwrap());
        assert!(!fx.item(series.id).await.has_interactive_thumbnail);
    }

    #[tokio::test]
    async fn purge_without_artifacts_is_a_no_op() {
        let fx = Fixture::new().await;
        let series = fx.series("S1").await;
        assert_eq!(fx.attachments.purge_artifacts(series.id, true).await.unwrap(), 0);
        assert!(!fx.item(series.id).await.has_interactive_thumbnail);
    }

    #[tokio::test]
    async fn purge_keeps_blob_shared_with_an_ordinary_file() {
        let fx = Fixture::new().await;
        let series = fx.series("S1").await;
        let (_, ordinary) = fx.upload(series.id, "same.png", None).await;
        fx.artifacts(series.id, &["same.png"]).await;

        fx.attachments.purge_artifacts(series.id, true).await.unwrap();
        assert!(fx.assets.exists(&ordinary.sha256).await.unwrap());
    }

    #[tokio::test]
    async fn item_removal_refuses_counter_underflow() {
        let fx = Fixture::new().await;
        let study = fx.study("P001").await;
        let item = fx
            .uow
            .items
            .create_item(NewItem {
                name: "orphan".into(),
                description: String::new(),
                folder_id: study.id,
                creator_id: fx.owner.id,
                is_series: true,
            })
            .await
            .unwrap();

        let outcome = fx.attachments.handle_item_removed(&item).await.unwrap();
        assert_eq!(outcome, Some(CounterOutcome::Underflow));
        assert_eq!(fx.folder(study.id).await.n_series, 0);
    }

    #[tokio::test]
    async fn item_removal_purges_artifacts_of_plain_items() {
        let fx = Fixture::new().await;
        let series = fx.series("S1").await;
        let mut plain = fx.item(series.id).await;
        plain.is_series = false;
        plain.folder_id = FolderId::new();
        fx.artifacts(series.id, &["a.png"]).await;

        let outcome = fx.attachments.handle_item_removed(&plain).await.unwrap();
        assert_eq!(outcome, None);
        assert!(fx.uow.files.list_attached(series.id).await.unwrap().is_empty());
    }
}
