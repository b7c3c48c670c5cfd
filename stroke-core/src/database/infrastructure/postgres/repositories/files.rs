use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgRow};
use uuid::Uuid;

use super::column;
use crate::database::ports::files::FilesRepository;
use crate::error::{CatalogError, Result};
use crate::types::{AttachmentType, FileId, FileRecord, ItemId, UserId};

pub(super) const FILE_COLUMNS: &str = "id, name, size, mime_type, sha256, item_id, attached_to_id, \
                            attached_to_type, interactive_thumbnails_uid, creator_id, created";

#[derive(Debug, Clone)]
pub struct PostgresFilesRepository {
    pool: PgPool,
}

impl PostgresFilesRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(super) fn map_row(row: &PgRow) -> Result<FileRecord> {
        let attached_to_type: Option<String> = column(row, "attached_to_type")?;
        let attached_to_type = match attached_to_type {
            Some(raw) => Some(AttachmentType::parse(&raw).ok_or_else(|| {
                CatalogError::Database(format!("unknown attachment type {raw}"))
            })?),
            None => None,
        };

        Ok(FileRecord {
            id: FileId(column(row, "id")?),
            name: column(row, "name")?,
            size: column(row, "size")?,
            mime_type: column(row, "mime_type")?,
            sha256: column(row, "sha256")?,
            item_id: column::<Option<Uuid>>(row, "item_id")?.map(ItemId),
            attached_to_id: column(row, "attached_to_id")?,
            attached_to_type,
            interactive_thumbnails_uid: column(row, "interactive_thumbnails_uid")?,
            creator_id: column::<Option<Uuid>>(row, "creator_id")?.map(UserId),
            created: column(row, "created")?,
        })
    }

    async fn fetch_many(&self, sql: &str, id: Uuid) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query(sql).bind(id).fetch_all(self.pool()).await?;
        rows.iter().map(Self::map_row).collect()
    }
}

#[async_trait]
impl FilesRepository for PostgresFilesRepository {
    async fn create_file(&self, file: FileRecord) -> Result<FileRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO files (
                id, name, size, mime_type, sha256, item_id, attached_to_id,
                attached_to_type, interactive_thumbnails_uid, creator_id, created
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(file.id.as_uuid())
        .bind(&file.name)
        .bind(file.size)
        .bind(&file.mime_type)
        .bind(&file.sha256)
        .bind(file.item_id.map(|id| id.as_uuid()))
        .bind(file.attached_to_id)
        .bind(file.attached_to_type.map(AttachmentType::as_str))
        .bind(&file.interactive_thumbnails_uid)
        .bind(file.creator_id.map(|id| id.as_uuid()))
        .bind(file.created)
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(file),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(CatalogError::not_found(format!(
                    "item {} for file {}",
                    file.item_id.map(|id| id.to_string()).unwrap_or_default(),
                    file.name
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_file(&self, id: FileId) -> Result<Option<FileRecord>> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn save_file(&self, file: &FileRecord) -> Result<FileRecord> {
        let result = sqlx::query(
            r#"
            UPDATE files
            SET name = $2, size = $3, mime_type = $4, sha256 = $5, item_id = $6,
                attached_to_id = $7, attached_to_type = $8, interactive_thumbnails_uid = $9
            WHERE id = $1
            "#,
        )
        .bind(file.id.as_uuid())
        .bind(&file.name)
        .bind(file.size)
        .bind(&file.mime_type)
        .bind(&file.sha256)
        .bind(file.item_id.map(|id| id.as_uuid()))
        .bind(file.attached_to_id)
        .bind(file.attached_to_type.map(AttachmentType::as_str))
        .bind(&file.interactive_thumbnails_uid)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::not_found(format!("file {}", file.id)));
        }
        Ok(file.clone())
    }

    async fn list_item_files(&self, item: ItemId) -> Result<Vec<FileRecord>> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE item_id = $1 ORDER BY name, id");
        self.fetch_many(&sql, item.as_uuid()).await
    }

    async fn list_attached(&self, item: ItemId) -> Result<Vec<FileRecord>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files \
             WHERE attached_to_type = 'item' AND attached_to_id = $1 ORDER BY name, id"
        );
        self.fetch_many(&sql, item.as_uuid()).await
    }

    async fn find_artifact(&self, item: ItemId, uid: &str) -> Result<Option<FileRecord>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files \
             WHERE attached_to_type = 'item' AND attached_to_id = $1 \
               AND interactive_thumbnails_uid = $2 \
             ORDER BY created DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(item.as_uuid())
            .bind(uid)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn delete_file(&self, id: FileId) -> Result<Option<FileRecord>> {
        let sql = format!("DELETE FROM files WHERE id = $1 RETURNING {FILE_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn count_by_sha256(&self, sha256: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE sha256 = $1")
            .bind(sha256)
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }
}
