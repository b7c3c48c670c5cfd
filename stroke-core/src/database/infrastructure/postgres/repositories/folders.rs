use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, postgres::PgRow};
use tracing::debug;
use uuid::Uuid;

use super::column;
use crate::database::ports::folders::FoldersRepository;
use crate::error::{CatalogError, Result};
use crate::types::{
    AccessEntry, AccessLevel, CounterOutcome, Folder, FolderId, NewFolder, Page, ParentType,
    Sort, StudyFields, StudySortField, User, UserId, catalog::collision_name,
};

/// Renames tried before a colliding create gives up.
const MAX_RENAME_ATTEMPTS: u32 = 1000;

const FOLDER_COLUMNS: &str = r#"
    f.id, f.name, f.description, f.parent_id, f.parent_collection, f.creator_id,
    f.public, f.created, f.updated, f.is_study, f.n_series,
    f.patient_id, f.study_date, f.study_modality,
    ARRAY(SELECT a.user_id FROM folder_access a WHERE a.folder_id = f.id ORDER BY a.user_id)
        AS access_users,
    ARRAY(SELECT a.level FROM folder_access a WHERE a.folder_id = f.id ORDER BY a.user_id)
        AS access_levels
"#;

#[derive(Debug, Clone)]
pub struct PostgresFoldersRepository {
    pool: PgPool,
}

impl PostgresFoldersRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_row(row: &PgRow) -> Result<Folder> {
        let parent_collection: String = column(row, "parent_collection")?;
        let parent_collection = ParentType::parse(&parent_collection).ok_or_else(|| {
            CatalogError::Database(format!("unknown parent type {parent_collection}"))
        })?;

        let users: Vec<Uuid> = column(row, "access_users")?;
        let levels: Vec<i16> = column(row, "access_levels")?;
        let access = users
            .into_iter()
            .zip(levels)
            .filter_map(|(user, level)| {
                AccessLevel::from_i16(level).map(|level| AccessEntry {
                    user_id: UserId(user),
                    level,
                })
            })
            .collect();

        let is_study: bool = column(row, "is_study")?;
        let patient_id: Option<String> = column(row, "patient_id")?;
        let study_date: Option<DateTime<Utc>> = column(row, "study_date")?;
        let study_modality: Option<String> = column(row, "study_modality")?;
        let study = match (is_study, patient_id, study_date, study_modality) {
            (true, Some(patient_id), Some(study_date), Some(study_modality)) => {
                Some(StudyFields {
                    patient_id,
                    study_date,
                    study_modality,
                })
            }
            _ => None,
        };

        Ok(Folder {
            id: FolderId(column(row, "id")?),
            name: column(row, "name")?,
            description: column(row, "description")?,
            parent_id: column(row, "parent_id")?,
            parent_collection,
            creator_id: UserId(column(row, "creator_id")?),
            public: column(row, "public")?,
            access,
            created: column(row, "created")?,
            updated: column(row, "updated")?,
            is_study,
            n_series: column(row, "n_series")?,
            study,
        })
    }
}

#[async_trait]
impl FoldersRepository for PostgresFoldersRepository {
    async fn create_folder(&self, folder: NewFolder) -> Result<Folder> {
        let base = folder.name.trim().to_string();
        let allow_rename = folder.allow_rename;
        let mut tx = self.pool().begin().await?;

        let mut attempt = 0;
        let created = loop {
            let candidate = folder.clone().into_folder(collision_name(&base, attempt));
            let study = candidate.study.as_ref();
            let inserted = sqlx::query(
                r#"
                INSERT INTO folders (
                    id, name, description, parent_id, parent_collection, creator_id,
                    public, created, updated, is_study, n_series,
                    patient_id, study_date, study_modality
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                ON CONFLICT ON CONSTRAINT folders_sibling_name_key DO NOTHING
                "#,
            )
            .bind(candidate.id.as_uuid())
            .bind(&candidate.name)
            .bind(&candidate.description)
            .bind(candidate.parent_id)
            .bind(candidate.parent_collection.as_str())
            .bind(candidate.creator_id.as_uuid())
            .bind(candidate.public)
            .bind(candidate.created)
            .bind(candidate.updated)
            .bind(candidate.is_study)
            .bind(candidate.n_series)
            .bind(study.map(|s| s.patient_id.clone()))
            .bind(study.map(|s| s.study_date))
            .bind(study.map(|s| s.study_modality.clone()))
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted == 1 {
                break candidate;
            }
            if !allow_rename {
                return Err(CatalogError::conflict(format!(
                    "a folder named {base} already exists here"
                )));
            }
            attempt += 1;
            if attempt > MAX_RENAME_ATTEMPTS {
                return Err(CatalogError::conflict(format!(
                    "could not find a free name for folder {base}"
                )));
            }
            debug!("folder name {} taken, trying rename #{}", base, attempt);
        };

        for entry in &created.access {
            sqlx::query(
                "INSERT INTO folder_access (folder_id, user_id, level) VALUES ($1, $2, $3)",
            )
            .bind(created.id.as_uuid())
            .bind(entry.user_id.as_uuid())
            .bind(entry.level.as_i16())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn get_folder(&self, id: FolderId) -> Result<Option<Folder>> {
        let sql = format!("SELECT {FOLDER_COLUMNS} FROM folders f WHERE f.id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn list_studies(
        &self,
        viewer: Option<&User>,
        sort: Sort<StudySortField>,
        page: Page,
    ) -> Result<Vec<Folder>> {
        // Column and direction come from closed enums, never from caller text.
        let sql = format!(
            r#"
            SELECT {FOLDER_COLUMNS}
            FROM folders f
            WHERE f.is_study
              AND (
                $1
                OR f.public
                OR EXISTS (
                    SELECT 1 FROM folder_access a
                    WHERE a.folder_id = f.id AND a.user_id = $2
                )
              )
            ORDER BY f.{} {}, f.id ASC
            LIMIT $3 OFFSET $4
            "#,
            sort.field.column(),
            sort.direction.as_sql(),
        );

        let limit = (page.limit > 0).then_some(i64::from(page.limit));
        let rows = sqlx::query(&sql)
            .bind(viewer.is_some_and(|user| user.admin))
            .bind(viewer.map(|user| user.id.as_uuid()))
            .bind(limit)
            .bind(i64::from(page.offset))
            .fetch_all(self.pool())
            .await?;

        rows.iter().map(Self::map_row).collect()
    }

    async fn adjust_series_count(&self, id: FolderId, delta: i64) -> Result<CounterOutcome> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE folders
            SET n_series = n_series + $2, updated = NOW()
            WHERE id = $1 AND n_series + $2 >= 0
            RETURNING n_series
            "#,
        )
        .bind(id.as_uuid())
        .bind(delta)
        .fetch_optional(self.pool())
        .await?;

        if let Some(value) = updated {
            return Ok(CounterOutcome::Applied(value));
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM folders WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(self.pool())
            .await?;

        Ok(if exists {
            CounterOutcome::Underflow
        } else {
            CounterOutcome::Missing
        })
    }

    async fn grant_access(&self, id: FolderId, user: UserId, level: AccessLevel) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO folder_access (folder_id, user_id, level)
            VALUES ($1, $2, $3)
            ON CONFLICT (folder_id, user_id) DO UPDATE SET level = EXCLUDED.level
            "#,
        )
        .bind(id.as_uuid())
        .bind(user.as_uuid())
        .bind(level.as_i16())
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(CatalogError::not_found(format!("folder {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }
}
