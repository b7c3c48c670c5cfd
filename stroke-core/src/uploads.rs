//! Upload target: bytes in, item-owned file record out, then finalization.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tracing::{debug, info};

use crate::{
    application::unit_of_work::CatalogUnitOfWork,
    artifacts::ArtifactAttachmentManager,
    assetstore::{AssetStore, BlobLease},
    catalog::AccessGuard,
    error::{CatalogError, Result},
    types::{AccessLevel, FileRecord, ItemId, Upload, User, UserId},
};

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Clone)]
pub struct UploadService {
    uow: Arc<CatalogUnitOfWork>,
    assets: AssetStore,
    access: AccessGuard,
    attachments: ArtifactAttachmentManager,
}

impl fmt::Debug for UploadService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadService")
            .field("assets", &self.assets)
            .finish_non_exhaustive()
    }
}

impl UploadService {
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

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    /// Single-shot upload on behalf of `user`, who needs write access on the
    /// target item.
    pub async fn upload<R>(
        &self,
        user: &User,
        item: ItemId,
        name: &str,
        mime_type: Option<&str>,
        reference: Option<String>,
        body: R,
    ) -> Result<FileRecord>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.access
            .require_item(Some(user), item, AccessLevel::Write)
            .await?;
        let name = validate_name(name)?;
        let lease = self.assets.put_reader(body).await?;

        let upload = Upload {
            item_id: item,
            name: name.to_string(),
            mime_type: mime_type
                .filter(|m| !m.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| guess_mime_type(name)),
            size: lease.blob().size,
            creator_id: Some(user.id),
            reference,
        };
        self.finalize(upload, lease).await
    }

    /// Upload a file from local disk without an access check. Used by job
    /// result hooks, which run under the authority of the job's creator.
    pub async fn upload_path(
        &self,
        creator: Option<UserId>,
        item: ItemId,
        path: &Path,
        reference: Option<String>,
    ) -> Result<FileRecord> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                CatalogError::validation(format!("unusable file name: {}", path.display()))
            })?;
        let name = validate_name(name)?;
        let lease = self.assets.put_file(path).await?;

        let upload = Upload {
            item_id: item,
            name: name.to_string(),
            mime_type: guess_mime_type(name),
            size: lease.blob().size,
            creator_id: creator,
            reference,
        };
        self.finalize(upload, lease).await
    }

    async fn finalize(&self, upload: Upload, lease: BlobLease) -> Result<FileRecord> {
        let record = upload.to_file(lease.blob().sha256.clone());
        let file = match self.uow.files.create_file(record).await {
            Ok(file) => file,
            Err(err) => {
                if let Err(cleanup) = self.assets.discard(lease, self.uow.files.as_ref()).await {
                    debug!(error = %cleanup, "could not release orphaned blob");
                }
                return Err(err);
            }
        };
        drop(lease);
        debug!(file = %file.id, item = %upload.item_id, size = file.size, "upload stored");

        let file = self.attachments.handle_upload_finalized(&upload, file).await?;
        info!(file = %file.id, name = %file.name, "upload finalized");
        Ok(file)
    }

    /// Copy an item's ordinary files into `dir`, one file per record name.
    pub async fn export_item_files(&self, item: ItemId, dir: &Path) -> Result<usize> {
        tokio::fs::create_dir_all(dir).await?;
        let files = self.uow.files.list_item_files(item).await?;
        for file in &files {
            let name = validate_name(&file.name)?;
            let source = self.assets.path_for(&file.sha256)?;
            tokio::fs::copy(&source, dir.join(name)).await?;
        }
        Ok(files.len())
    }
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(CatalogError::validation(format!("invalid file name: {name:?}")));
    }
    Ok(name)
}

pub fn guess_mime_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first()
        .map_or_else(|| DEFAULT_MIME_TYPE.into(), |mime| mime.to_string())
}
