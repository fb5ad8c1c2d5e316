//! reactdb core - storage engine, entity codec and query cursors.
//!
//! This crate provides the persistence collaborator consumed by the reactive
//! layer in the `reactdb` crate.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod database;
pub mod entity;
pub mod error;
pub mod query;
pub mod storage;

pub use database::{Database, EntityCursor, EntityStore};
pub use entity::Entity;
pub use error::Error;
pub use query::{CompareOp, Filter, Query};
pub use storage::{Cursor, Record, StorageConfig, StorageEngine, TableCursor};
