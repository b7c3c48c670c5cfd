//! Studies, series and the access rules they inherit from their folders.

pub mod access;
pub mod hierarchy;

pub use access::AccessGuard;
pub use hierarchy::{CatalogHierarchyManager, NewStudy, RemovedItem};
