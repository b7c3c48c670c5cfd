use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{FileRecord, ItemId, UserId};
use crate::uploads::UploadService;

use super::container::JobEnvironment;

#[async_trait]
impl JobEnvironment for UploadService {
    async fn materialize_item(&self, item: ItemId, dir: &Path) -> Result<usize> {
        self.export_item_files(item, dir).await
    }

    async fn upload_output(
        &self,
        creator: Option<UserId>,
        item: ItemId,
        path: &Path,
        reference: &str,
    ) -> Result<FileRecord> {
        self.upload_path(creator, item, path, Some(reference.to_string()))
            .await
    }
}
