//! PostgreSQL-backed repository implementations.

pub mod collections;
pub mod files;
pub mod folders;
pub mod items;
pub mod sessions;
pub mod settings;
pub mod users;

use sqlx::{Decode, Postgres, Row, Type, postgres::PgRow};

use crate::error::{CatalogError, Result};

/// Typed column read that reports which column failed to decode.
pub(crate) fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| CatalogError::Database(format!("Failed to read {name}: {e}")))
}
