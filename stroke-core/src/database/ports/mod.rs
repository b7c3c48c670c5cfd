//! Repository ports (interfaces) for the entity store.
//!
//! Services depend only on these traits; adapters live under
//! `database::memory` and `database::postgres`. Every mutation that has to be
//! atomic under concurrent requests (counter increments, flag updates, file
//! reparenting) is a single port call so the adapter can make it atomic.

pub mod collections;
pub mod files;
pub mod folders;
pub mod items;
pub mod sessions;
pub mod settings;
pub mod users;
