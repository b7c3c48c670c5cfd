use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::{
    application::unit_of_work::CatalogUnitOfWork,
    artifacts::ArtifactAttachmentManager,
    assetstore::AssetStore,
    catalog::AccessGuard,
    error::{CatalogError, Result},
    types::{AccessLevel, FileRecord, ItemId, JobId, User},
};

use super::job_spec::JobSpec;
use super::substrate::{ExecutionSubstrate, Job, JobHandle};

/// An artifact ready to be streamed.
#[derive(Debug)]
pub struct ThumbnailContent {
    pub file: FileRecord,
    pub body: tokio::fs::File,
}

/// Items with a thumbnail job that has not finished yet.
#[derive(Debug, Default)]
struct InFlight {
    items: Mutex<HashSet<ItemId>>,
}

/// Holds an item's in-flight slot until dropped.
struct InFlightSlot {
    owner: Arc<InFlight>,
    item: ItemId,
}

impl InFlight {
    fn reserve(self: &Arc<Self>, item: ItemId) -> Option<InFlightSlot> {
        if !self.items.lock().insert(item) {
            return None;
        }
        Some(InFlightSlot {
            owner: Arc::clone(self),
            item,
        })
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.owner.items.lock().remove(&self.item);
    }
}

#[derive(Clone)]
pub struct ThumbnailOrchestrator {
    uow: Arc<CatalogUnitOfWork>,
    access: AccessGuard,
    assets: AssetStore,
    attachments: ArtifactAttachmentManager,
    substrate: Arc<dyn ExecutionSubstrate>,
    in_flight: Arc<InFlight>,
    image: String,
}

impl fmt::Debug for ThumbnailOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThumbnailOrchestrator")
            .field("image", &self.image)
            .field("in_flight", &self.in_flight.items.lock().len())
            .finish_non_exhaustive()
    }
}

impl ThumbnailOrchestrator {
    pub fn new(
        uow: Arc<CatalogUnitOfWork>,
        assets: AssetStore,
        attachments: ArtifactAttachmentManager,
        substrate: Arc<dyn ExecutionSubstrate>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            access: AccessGuard::new(uow.clone()),
            uow,
            assets,
            attachments,
            substrate,
            in_flight: Arc::new(InFlight::default()),
            image: image.into(),
        }
    }

    /// Drop the item's current artifacts and start a job that produces new
    /// ones. Returns as soon as the job is submitted. Only one job per item
    /// may be unfinished at a time; a second request is a `Conflict`.
    #[instrument(skip(self, user), fields(user = %user.login))]
    pub async fn generate_thumbnail(&self, user: &User, item: ItemId) -> Result<JobHandle> {
        let (item, _) = self
            .access
            .require_item(Some(user), item, AccessLevel::Write)
            .await?;

        let slot = self.in_flight.reserve(item.id).ok_or_else(|| {
            CatalogError::conflict(format!(
                "a thumbnail job for item {} is already running",
                item.id
            ))
        })?;

        self.attachments.purge_artifacts(item.id, true).await?;

        let spec = JobSpec::dicom_thumbnail(&item, user.id, &self.image);
        let handle = self.substrate.submit(spec).await?;
        info!(job = %handle.id(), item = %item.id, "submitted thumbnail job");

        let mut watcher = handle.clone();
        tokio::spawn(async move {
            let status = watcher.wait().await;
            debug!(job = %watcher.id(), ?status, "releasing thumbnail slot");
            drop(slot);
        });

        Ok(handle)
    }

    /// Open the artifact with `uid` attached to the item.
    pub async fn get_thumbnail(
        &self,
        viewer: Option<&User>,
        item: ItemId,
        uid: &str,
    ) -> Result<ThumbnailContent> {
        let (item, _) = self
            .access
            .require_item(viewer, item, AccessLevel::Read)
            .await?;
        let file = self
            .uow
            .files
            .find_artifact(item.id, uid)
            .await?
            .ok_or_else(|| {
                CatalogError::not_found(format!("no thumbnail {uid} on item {}", item.id))
            })?;
        let body = self.assets.open(&file.sha256).await?;
        Ok(ThumbnailContent { file, body })
    }

    /// A job's record, visible to its creator and site admins.
    pub fn get_job(&self, user: &User, id: JobId) -> Result<Job> {
        let job = self
            .substrate
            .registry()
            .get(id)
            .ok_or_else(|| CatalogError::not_found(format!("job {id}")))?;
        if !user.admin && job.creator_id != user.id {
            return Err(CatalogError::access_denied(format!(
                "job {id} belongs to another user"
            )));
        }
        Ok(job)
    }

    pub fn is_generating(&self, item: ItemId) -> bool {
        self.in_flight.items.lock().contains(&item)
    }
}
