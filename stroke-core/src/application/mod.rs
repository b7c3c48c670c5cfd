pub mod unit_of_work;

pub use unit_of_work::{CatalogUnitOfWork, CatalogUnitOfWorkBuilder};
