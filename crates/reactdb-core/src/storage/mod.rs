//! Storage layer for reactdb.
//!
//! This module provides a sled-based table store: one tree per entity kind,
//! rows keyed by a big-endian `u64` id.

mod config;
mod cursor;
mod engine;
mod record;

pub mod key;

pub use config::StorageConfig;
pub use cursor::{Cursor, TableCursor};
pub use engine::StorageEngine;
pub use record::Record;
