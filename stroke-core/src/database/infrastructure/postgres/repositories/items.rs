use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgRow};

use super::column;
use super::files::{FILE_COLUMNS, PostgresFilesRepository};
use crate::database::ports::items::{DeletedItem, ItemFilter, ItemsRepository};
use crate::error::{CatalogError, Result};
use crate::types::{FolderId, Item, ItemId, NewItem, Page, SeriesSortField, Sort, UserId};

const ITEM_COLUMNS: &str = "id, name, description, folder_id, creator_id, created, updated, \
                            is_series, has_interactive_thumbnail";

#[derive(Debug, Clone)]
pub struct PostgresItemsRepository {
    pool: PgPool,
}

impl PostgresItemsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_row(row: &PgRow) -> Result<Item> {
        Ok(Item {
            id: ItemId(column(row, "id")?),
            name: column(row, "name")?,
            description: column(row, "description")?,
            folder_id: FolderId(column(row, "folder_id")?),
            creator_id: UserId(column(row, "creator_id")?),
            created: column(row, "created")?,
            updated: column(row, "updated")?,
            is_series: column(row, "is_series")?,
            has_interactive_thumbnail: column(row, "has_interactive_thumbnail")?,
        })
    }
}

#[async_trait]
impl ItemsRepository for PostgresItemsRepository {
    async fn create_item(&self, item: NewItem) -> Result<Item> {
        let item = item.into_item();
        let result = sqlx::query(
            r#"
            INSERT INTO items (
                id, name, description, folder_id, creator_id,
                created, updated, is_series, has_interactive_thumbnail
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.folder_id.as_uuid())
        .bind(item.creator_id.as_uuid())
        .bind(item.created)
        .bind(item.updated)
        .bind(item.is_series)
        .bind(item.has_interactive_thumbnail)
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(item),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => Err(
                CatalogError::not_found(format!("folder {}", item.folder_id)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn list_child_items(
        &self,
        folder: FolderId,
        filter: ItemFilter,
        sort: Sort<SeriesSortField>,
        page: Page,
    ) -> Result<Vec<Item>> {
        let sql = format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM items
            WHERE folder_id = $1 AND (NOT $2 OR is_series)
            ORDER BY {} {}, id ASC
            LIMIT $3 OFFSET $4
            "#,
            sort.field.column(),
            sort.direction.as_sql(),
        );
        let limit = (page.limit > 0).then_some(i64::from(page.limit));
        let rows = sqlx::query(&sql)
            .bind(folder.as_uuid())
            .bind(filter.series_only)
            .bind(limit)
            .bind(i64::from(page.offset))
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(Self::map_row).collect()
    }

    async fn count_child_items(&self, folder: FolderId, filter: ItemFilter) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM items WHERE folder_id = $1 AND (NOT $2 OR is_series)",
        )
        .bind(folder.as_uuid())
        .bind(filter.series_only)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    async fn set_thumbnail_flag(&self, id: ItemId, value: bool) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE items SET has_interactive_thumbnail = $2, updated = NOW() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(value)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_item(&self, id: ItemId) -> Result<Option<DeletedItem>> {
        let mut tx = self.pool().begin().await?;

        // Holding the row blocks file inserts that reference it until commit.
        let locked = sqlx::query("SELECT id FROM items WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(None);
        }

        let sql = format!("DELETE FROM files WHERE item_id = $1 RETURNING {FILE_COLUMNS}");
        let files = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(PostgresFilesRepository::map_row)
            .collect::<Result<Vec<_>>>()?;

        let sql = format!("DELETE FROM items WHERE id = $1 RETURNING {ITEM_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_one(&mut *tx)
            .await?;
        let item = Self::map_row(&row)?;

        tx.commit().await?;
        Ok(Some(DeletedItem { item, files }))
    }
}
