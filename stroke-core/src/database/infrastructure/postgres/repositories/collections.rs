use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgRow};

use super::column;
use crate::database::ports::collections::CollectionsRepository;
use crate::error::{CatalogError, Result};
use crate::types::{Collection, CollectionId, UserId};

#[derive(Debug, Clone)]
pub struct PostgresCollectionsRepository {
    pool: PgPool,
}

impl PostgresCollectionsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: &PgRow) -> Result<Collection> {
        Ok(Collection {
            id: CollectionId(column(row, "id")?),
            name: column(row, "name")?,
            description: column(row, "description")?,
            creator_id: UserId(column(row, "creator_id")?),
            public: column(row, "public")?,
            created: column(row, "created")?,
        })
    }
}

#[async_trait]
impl CollectionsRepository for PostgresCollectionsRepository {
    async fn create_collection(&self, collection: Collection) -> Result<Collection> {
        sqlx::query(
            r#"
            INSERT INTO collections (id, name, description, creator_id, public, created)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(collection.id.as_uuid())
        .bind(&collection.name)
        .bind(&collection.description)
        .bind(collection.creator_id.as_uuid())
        .bind(collection.public)
        .bind(collection.created)
        .execute(&self.pool)
        .await
        .map_err(|e| match CatalogError::from(e) {
            CatalogError::Conflict(_) => CatalogError::conflict(format!(
                "a collection named {} already exists",
                collection.name
            )),
            other => other,
        })?;
        Ok(collection)
    }

    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>> {
        let row = sqlx::query(
            "SELECT id, name, description, creator_id, public, created \
             FROM collections WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::map_row).transpose()
    }
}
