#![cfg(feature = "database")]

use std::sync::Arc;

use anyhow::Result;
use stroke_core::application::CatalogUnitOfWork;
use stroke_core::database::PostgresDatabase;
use stroke_core::types::{
    CounterOutcome, NewFolder, NewItem, Page, ParentType, Sort, StudyFields, StudySortField,
    Upload, User,
};
use sqlx::PgPool;

async fn catalog(pool: PgPool) -> Result<CatalogUnitOfWork> {
    let db = Arc::new(PostgresDatabase::from_pool(pool));
    CatalogUnitOfWork::from_postgres(db).map_err(anyhow::Error::msg)
}

fn study(owner: &User, patient_id: &str, public: bool) -> NewFolder {
    NewFolder {
        name: patient_id.to_string(),
        description: String::new(),
        parent_id: owner.id.as_uuid(),
        parent_collection: ParentType::User,
        creator_id: owner.id,
        public,
        allow_rename: true,
        study: Some(StudyFields {
            patient_id: patient_id.to_string(),
            study_date: chrono::Utc::now(),
            study_modality: "MR".to_string(),
        }),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a PostgreSQL DATABASE_URL"]
async fn series_counter_refuses_underflow(pool: PgPool) -> Result<()> {
    let uow = catalog(pool).await?;
    let owner = uow
        .users
        .create_user(User::new("owner", "owner@example.org", "O", "Wner", true))
        .await?;
    let folder = uow.folders.create_folder(study(&owner, "P1", false)).await?;

    assert_eq!(
        uow.folders.adjust_series_count(folder.id, 1).await?,
        CounterOutcome::Applied(1)
    );
    assert_eq!(
        uow.folders.adjust_series_count(folder.id, -1).await?,
        CounterOutcome::Applied(0)
    );
    assert_eq!(
        uow.folders.adjust_series_count(folder.id, -1).await?,
        CounterOutcome::Underflow
    );
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a PostgreSQL DATABASE_URL"]
async fn colliding_study_names_are_renamed(pool: PgPool) -> Result<()> {
    let uow = catalog(pool).await?;
    let owner = uow
        .users
        .create_user(User::new("owner", "owner@example.org", "O", "Wner", true))
        .await?;

    let first = uow.folders.create_folder(study(&owner, "P1", false)).await?;
    let second = uow.folders.create_folder(study(&owner, "P1", false)).await?;
    assert_eq!(first.name, "P1");
    assert_eq!(second.name, "P1 (1)");
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a PostgreSQL DATABASE_URL"]
async fn anonymous_listing_sees_only_public_studies(pool: PgPool) -> Result<()> {
    let uow = catalog(pool).await?;
    let owner = uow
        .users
        .create_user(User::new("owner", "owner@example.org", "O", "Wner", false))
        .await?;
    uow.folders.create_folder(study(&owner, "hidden", false)).await?;
    let shown = uow.folders.create_folder(study(&owner, "shown", true)).await?;

    let anonymous = uow
        .folders
        .list_studies(None, Sort::ascending(StudySortField::default()), Page::new(None, None))
        .await?;
    assert_eq!(anonymous.len(), 1);
    assert_eq!(anonymous[0].id, shown.id);

    let as_owner = uow
        .folders
        .list_studies(Some(&owner), Sort::ascending(StudySortField::default()), Page::new(None, None))
        .await?;
    assert_eq!(as_owner.len(), 2);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a PostgreSQL DATABASE_URL"]
async fn thumbnail_flag_is_a_single_field_update(pool: PgPool) -> Result<()> {
    let uow = catalog(pool).await?;
    let owner = uow
        .users
        .create_user(User::new("owner", "owner@example.org", "O", "Wner", false))
        .await?;
    let folder = uow.folders.create_folder(study(&owner, "P1", false)).await?;
    let item = uow
        .items
        .create_item(NewItem {
            name: "T1".to_string(),
            description: String::new(),
            folder_id: folder.id,
            creator_id: owner.id,
            is_series: true,
        })
        .await?;

    assert!(uow.items.set_thumbnail_flag(item.id, true).await?);
    let stored = uow.items.get_item(item.id).await?.unwrap();
    assert!(stored.has_interactive_thumbnail);
    assert_eq!(stored.name, "T1");

    assert!(uow.items.delete_item(item.id).await?.is_some());
    assert!(!uow.items.set_thumbnail_flag(item.id, false).await?);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a PostgreSQL DATABASE_URL"]
async fn item_delete_returns_owned_files(pool: PgPool) -> Result<()> {
    let uow = catalog(pool).await?;
    let owner = uow
        .users
        .create_user(User::new("owner", "owner@example.org", "O", "Wner", false))
        .await?;
    let folder = uow.folders.create_folder(study(&owner, "P1", false)).await?;
    let item = uow
        .items
        .create_item(NewItem {
            name: "T1".to_string(),
            description: String::new(),
            folder_id: folder.id,
            creator_id: owner.id,
            is_series: true,
        })
        .await?;
    let upload = Upload {
        item_id: item.id,
        name: "scan.dcm".to_string(),
        mime_type: "application/dicom".to_string(),
        size: 4,
        creator_id: Some(owner.id),
        reference: None,
    };
    let file = uow.files.create_file(upload.to_file("ab".repeat(32))).await?;

    let deleted = uow.items.delete_item(item.id).await?.unwrap();
    assert_eq!(deleted.item.id, item.id);
    assert_eq!(deleted.files.len(), 1);
    assert_eq!(deleted.files[0].id, file.id);
    assert!(uow.files.get_file(file.id).await?.is_none());
    Ok(())
}
