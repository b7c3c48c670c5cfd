use async_trait::async_trait;

use crate::{
    error::Result,
    types::{
        AccessLevel, CounterOutcome, Folder, FolderId, NewFolder, Page, Sort, StudySortField,
        User, UserId,
    },
};

#[async_trait]
pub trait FoldersRepository: Send + Sync {
    /// Insert a folder. With `allow_rename` a colliding sibling name gets a
    /// ` (n)` suffix; without it the collision is a `Conflict`.
    async fn create_folder(&self, folder: NewFolder) -> Result<Folder>;

    async fn get_folder(&self, id: FolderId) -> Result<Option<Folder>>;

    /// Studies the viewer can at least read, sorted, then paged.
    async fn list_studies(
        &self,
        viewer: Option<&User>,
        sort: Sort<StudySortField>,
        page: Page,
    ) -> Result<Vec<Folder>>;

    /// Atomically add `delta` to `nSeries`. A decrement that would go below
    /// zero is refused and reported as `CounterOutcome::Underflow`.
    async fn adjust_series_count(&self, id: FolderId, delta: i64) -> Result<CounterOutcome>;

    async fn grant_access(&self, id: FolderId, user: UserId, level: AccessLevel) -> Result<()>;
}
