//! Site settings and the collections they can point at.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::info;

use crate::{
    application::unit_of_work::CatalogUnitOfWork,
    error::{CatalogError, Result},
    types::{Collection, CollectionId, User},
};

/// Collection that holds the studies.
pub const STUDIES_COLLECTION_ID: &str = "stroke.studies_collection_id";

pub const KNOWN_SETTINGS: &[&str] = &[STUDIES_COLLECTION_ID];

#[derive(Debug, Clone)]
pub struct NewCollection {
    pub name: String,
    pub description: String,
    pub public: bool,
}

#[derive(Clone)]
pub struct SettingsService {
    uow: Arc<CatalogUnitOfWork>,
}

impl fmt::Debug for SettingsService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsService").finish_non_exhaustive()
    }
}

impl SettingsService {
    pub fn new(uow: Arc<CatalogUnitOfWork>) -> Self {
        Self { uow }
    }

    pub async fn get_setting(&self, user: &User, key: &str) -> Result<Option<Value>> {
        require_admin(user)?;
        known_key(key)?;
        self.uow.settings.get_setting(key).await
    }

    /// Validate and store a setting. A JSON `null` removes it.
    pub async fn set_setting(&self, user: &User, key: &str, value: Value) -> Result<()> {
        require_admin(user)?;
        known_key(key)?;

        if value.is_null() {
            self.uow.settings.unset_setting(key).await?;
            info!(key, "setting cleared");
            return Ok(());
        }

        self.validate(key, &value).await?;
        self.uow.settings.set_setting(key, value).await?;
        info!(key, "setting updated");
        Ok(())
    }

    async fn validate(&self, key: &str, value: &Value) -> Result<()> {
        match key {
            STUDIES_COLLECTION_ID => {
                let id = value
                    .as_str()
                    .and_then(|raw| raw.parse::<CollectionId>().ok())
                    .ok_or_else(|| {
                        CatalogError::validation(format!("{key} must be a collection id"))
                    })?;
                if self.uow.collections.get_collection(id).await?.is_none() {
                    return Err(CatalogError::validation(format!(
                        "{key}: no collection with id {id}"
                    )));
                }
                Ok(())
            }
            _ => Err(CatalogError::validation(format!("unknown setting key: {key}"))),
        }
    }

    /// The configured studies collection, if one is set and still exists.
    pub async fn studies_collection(&self) -> Result<Option<Collection>> {
        let Some(value) = self.uow.settings.get_setting(STUDIES_COLLECTION_ID).await? else {
            return Ok(None);
        };
        let Some(id) = value.as_str().and_then(|raw| raw.parse::<CollectionId>().ok()) else {
            return Ok(None);
        };
        self.uow.collections.get_collection(id).await
    }

    pub async fn create_collection(&self, user: &User, request: NewCollection) -> Result<Collection> {
        require_admin(user)?;
        let name = request.name.trim();
        if name.is_empty() {
            return Err(CatalogError::validation("collection name must not be empty"));
        }
        let collection = self
            .uow
            .collections
            .create_collection(Collection {
                id: CollectionId::new(),
                name: name.to_string(),
                description: request.description,
                creator_id: user.id,
                public: request.public,
                created: Utc::now(),
            })
            .await?;
        info!(collection = %collection.id, name = %collection.name, "created collection");
        Ok(collection)
    }

    pub async fn get_collection(&self, id: CollectionId) -> Result<Collection> {
        self.uow
            .collections
            .get_collection(id)
            .await?
            .ok_or_else(|| CatalogError::not_found(format!("collection {id}")))
    }
}

fn require_admin(user: &User) -> Result<()> {
    if user.admin {
        Ok(())
    } else {
        Err(CatalogError::access_denied("administrator access required"))
    }
}

fn known_key(key: &str) -> Result<()> {
    if KNOWN_SETTINGS.contains(&key) {
        Ok(())
    } else {
        Err(CatalogError::validation(format!("unknown setting key: {key}")))
    }
}
