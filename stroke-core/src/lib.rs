//! # Stroke Core
//!
//! Core library for the Stroke imaging catalog: a hierarchy of studies and
//! series, the files attached to them, and the container jobs that render
//! interactive DICOM thumbnails for a series.
//!
//! ## Overview
//!
//! - **Catalog**: studies are folders with patient metadata and an `nSeries`
//!   counter; series are items inside them. Access is decided per folder.
//! - **Artifacts**: uploads tagged with the thumbnail marker are reparented
//!   onto their item and keep the item's `hasInteractiveThumbnail` flag set.
//! - **Thumbnails**: job specifications run on an execution substrate
//!   (containers via the `docker` CLI) whose outputs are uploaded back as
//!   artifacts.
//! - **Auth**: password login with a guest bypass and opaque session tokens.
//! - **Storage**: repository ports with in-memory and PostgreSQL adapters,
//!   and a content-addressed asset store for file bodies.
//!
//! ## Feature Flags
//!
//! - `database`: PostgreSQL adapters (SQLx) and migrations
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stroke_core::{
//!     application::CatalogUnitOfWork,
//!     artifacts::ArtifactAttachmentManager,
//!     assetstore::AssetStore,
//!     catalog::{CatalogHierarchyManager, NewStudy},
//!     database::MemoryStore,
//!     types::User,
//! };
//!
//! async fn first_study() -> stroke_core::Result<()> {
//!     let uow = Arc::new(CatalogUnitOfWork::from_memory(Arc::new(MemoryStore::new())));
//!     let assets = AssetStore::new("/var/lib/stroke/assets");
//!     let attachments = ArtifactAttachmentManager::new(uow.clone(), assets.clone());
//!     let catalog = CatalogHierarchyManager::new(uow.clone(), assets, attachments);
//!
//!     let owner = uow
//!         .users
//!         .create_user(User::new("alice", "alice@example.org", "Alice", "A", true))
//!         .await?;
//!     let study = catalog
//!         .create_study(
//!             &owner,
//!             NewStudy {
//!                 patient_id: "P001".into(),
//!                 study_date: chrono::Utc::now(),
//!                 modality: "CT".into(),
//!                 description: String::new(),
//!                 public: false,
//!             },
//!         )
//!         .await?;
//!     catalog.create_series(&owner, study.id, "AX T1").await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod application;
pub mod artifacts;
pub mod assetstore;
pub mod auth;
pub mod catalog;
pub mod database;
pub mod error;
pub mod settings;
pub mod thumbnails;
pub mod types;
pub mod uploads;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{CatalogError, Result};
