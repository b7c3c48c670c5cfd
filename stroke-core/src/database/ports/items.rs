use async_trait::async_trait;

use crate::{
    error::Result,
    types::{FileRecord, FolderId, Item, ItemId, NewItem, Page, SeriesSortField, Sort},
};

/// What an item delete took with it: the final item snapshot and any of its
/// own file records still present at delete time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedItem {
    pub item: Item,
    pub files: Vec<FileRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemFilter {
    pub series_only: bool,
}

#[async_trait]
pub trait ItemsRepository: Send + Sync {
    async fn create_item(&self, item: NewItem) -> Result<Item>;

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>>;

    async fn list_child_items(
        &self,
        folder: FolderId,
        filter: ItemFilter,
        sort: Sort<SeriesSortField>,
        page: Page,
    ) -> Result<Vec<Item>>;

    async fn count_child_items(&self, folder: FolderId, filter: ItemFilter) -> Result<i64>;

    /// Single-field update of `hasInteractiveThumbnail`. Returns `false` when
    /// the item does not exist.
    async fn set_thumbnail_flag(&self, id: ItemId, value: bool) -> Result<bool>;

    /// Remove the item row together with its own file records, atomically
    /// with respect to uploads targeting the item. Blobs are left to the
    /// caller.
    async fn delete_item(&self, id: ItemId) -> Result<Option<DeletedItem>>;
}
