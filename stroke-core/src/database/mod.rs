//! Entity store: repository ports plus the in-memory and PostgreSQL
//! adapters behind them.

#[cfg(feature = "database")]
pub mod infrastructure;
pub mod memory;
pub mod ports;
#[cfg(feature = "database")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use postgres::{PoolStats, PostgresDatabase};
