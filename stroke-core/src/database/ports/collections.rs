use async_trait::async_trait;

use crate::{
    error::Result,
    types::{Collection, CollectionId},
};

#[async_trait]
pub trait CollectionsRepository: Send + Sync {
    /// Insert a collection; a taken name is a `Conflict`.
    async fn create_collection(&self, collection: Collection) -> Result<Collection>;

    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>>;
}
