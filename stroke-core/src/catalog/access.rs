use std::sync::Arc;

use crate::{
    application::unit_of_work::CatalogUnitOfWork,
    error::{CatalogError, Result},
    types::{AccessLevel, Folder, FolderId, Item, ItemId, User},
};

/// Resolves folders and items and enforces the folder's access policy on
/// them. Items carry no ACL of their own.
#[derive(Debug, Clone)]
pub struct AccessGuard {
    uow: Arc<CatalogUnitOfWork>,
}

impl AccessGuard {
    pub fn new(uow: Arc<CatalogUnitOfWork>) -> Self {
        Self { uow }
    }

    pub async fn require_folder(
        &self,
        viewer: Option<&User>,
        id: FolderId,
        level: AccessLevel,
    ) -> Result<Folder> {
        let folder = self
            .uow
            .folders
            .get_folder(id)
            .await?
            .ok_or_else(|| CatalogError::not_found(format!("folder {id}")))?;
        check(&folder, viewer, level)?;
        Ok(folder)
    }

    /// Load an item together with the folder it inherits access from.
    pub async fn require_item(
        &self,
        viewer: Option<&User>,
        id: ItemId,
        level: AccessLevel,
    ) -> Result<(Item, Folder)> {
        let item = self
            .uow
            .items
            .get_item(id)
            .await?
            .ok_or_else(|| CatalogError::not_found(format!("item {id}")))?;
        let folder = self
            .uow
            .folders
            .get_folder(item.folder_id)
            .await?
            .ok_or_else(|| CatalogError::not_found(format!("folder {}", item.folder_id)))?;
        check(&folder, viewer, level)?;
        Ok((item, folder))
    }
}

fn check(folder: &Folder, viewer: Option<&User>, level: AccessLevel) -> Result<()> {
    if folder.policy().allows(viewer, level) {
        return Ok(());
    }
    match viewer {
        None => Err(CatalogError::Unauthorized(
            "you must be logged in".to_string(),
        )),
        Some(user) => Err(CatalogError::access_denied(format!(
            "{} lacks {:?} access on folder {}",
            user.login, level, folder.id
        ))),
    }
}
