use async_trait::async_trait;

use crate::{
    error::Result,
    types::{FileId, FileRecord, ItemId},
};

#[async_trait]
pub trait FilesRepository: Send + Sync {
    async fn create_file(&self, file: FileRecord) -> Result<FileRecord>;

    async fn get_file(&self, id: FileId) -> Result<Option<FileRecord>>;

    /// Replace the stored record with `file` (matched by id).
    async fn save_file(&self, file: &FileRecord) -> Result<FileRecord>;

    /// Files owned by the item through `itemId`.
    async fn list_item_files(&self, item: ItemId) -> Result<Vec<FileRecord>>;

    /// Files attached directly to the item, artifacts or not.
    async fn list_attached(&self, item: ItemId) -> Result<Vec<FileRecord>>;

    async fn find_artifact(&self, item: ItemId, uid: &str) -> Result<Option<FileRecord>>;

    async fn delete_file(&self, id: FileId) -> Result<Option<FileRecord>>;

    /// Number of file records still pointing at a blob.
    async fn count_by_sha256(&self, sha256: &str) -> Result<i64>;
}
