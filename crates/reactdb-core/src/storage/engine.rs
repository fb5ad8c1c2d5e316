//! Storage engine implementation.

use super::key::{self, encode_id};
use super::{Record, StorageConfig, TableCursor};
use crate::entity::Entity;
use crate::error::Error;
use crate::query::Query;
use sled::{Db, Tree};
use tracing::debug;

/// The main storage engine wrapping sled.
///
/// Every table lives in its own sled tree, so counting or scanning one table
/// never touches rows of another.
pub struct StorageEngine {
    /// The underlying sled database.
    db: Db,
}

impl StorageEngine {
    /// Open or create a storage engine with the given configuration.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        debug!(
            path = %config.path.display(),
            temporary = config.temporary,
            recovered = db.was_recovered(),
            "storage engine opened"
        );
        Ok(Self { db })
    }

    /// Open the tree backing `table`. sled caches open trees, so this is cheap.
    fn table(&self, table: &str) -> Result<Tree, Error> {
        Ok(self.db.open_tree(key::tree_name(table))?)
    }

    /// Allocate a new row id. Ids are unique across tables and start at 1.
    pub fn next_id(&self) -> Result<u64, Error> {
        Ok(self.db.generate_id()? + 1)
    }

    /// Get a row by id.
    pub fn get(&self, table: &str, id: u64) -> Result<Option<Record>, Error> {
        match self.table(table)?.get(encode_id(id))? {
            Some(bytes) => Ok(Some(Record::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Insert or replace a row.
    ///
    /// Without an id a fresh one is allocated. With an id the row is replaced
    /// (keeping its creation time), or inserted under that id if missing.
    /// Returns the id the row was stored under.
    pub fn put(&self, table: &str, id: Option<u64>, data: Vec<u8>) -> Result<u64, Error> {
        let tree = self.table(table)?;
        let id = match id {
            Some(id) => id,
            None => self.next_id()?,
        };
        let key = encode_id(id);

        let record = match tree.get(key)? {
            Some(existing) => Record::from_bytes(&existing)?.replace(data),
            None => Record::new(data),
        };
        tree.insert(key, record.to_bytes()?)?;

        Ok(id)
    }

    /// Delete a row. Returns whether a row was removed.
    pub fn delete(&self, table: &str, id: u64) -> Result<bool, Error> {
        Ok(self.table(table)?.remove(encode_id(id))?.is_some())
    }

    /// Open a cursor over the rows of the query's table.
    pub fn scan<T: Entity>(&self, query: &Query) -> Result<TableCursor<T>, Error> {
        let tree = self.table(query.table())?;
        Ok(TableCursor::new(tree.iter(), query))
    }

    /// Number of rows stored in `table`. Rows are not decoded.
    pub fn count(&self, table: &str) -> Result<u64, Error> {
        Ok(self.table(table)?.len() as u64)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }
}
