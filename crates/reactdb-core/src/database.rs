//! Typed entity access over the storage engine.
//!
//! [`EntityStore`] is the capability set the reactive layer consumes: point
//! lookups, saves, deletes, cursor queries, id extraction, table naming and
//! raw counts. [`Database`] implements it on top of [`StorageEngine`].

use tracing::{trace, warn};

use crate::entity::{self, Entity};
use crate::error::Error;
use crate::query::Query;
use crate::storage::{Cursor, StorageConfig, StorageEngine};

/// Boxed cursor yielding entities of type `T`.
pub type EntityCursor<T> = Box<dyn Cursor<Item = T>>;

/// Persistence capabilities over typed entities.
pub trait EntityStore: Send + Sync {
    /// Look up an entity by id. A missing row is `Ok(None)`.
    fn get<T: Entity>(&self, id: u64) -> Result<Option<T>, Error>;

    /// Insert or update an entity, assigning an id when it has none.
    ///
    /// Returns the id the entity is stored under.
    fn put<T: Entity>(&self, entity: &mut T) -> Result<u64, Error>;

    /// Delete a persisted entity. Returns whether a row was removed.
    fn delete<T: Entity>(&self, entity: &T) -> Result<bool, Error>;

    /// Delete the row of kind `T` with the given id.
    fn delete_by_id<T: Entity>(&self, id: u64) -> Result<bool, Error>;

    /// Open a cursor over the entities matching `query`.
    fn query_all<T: Entity>(&self, query: &Query) -> Result<EntityCursor<T>, Error>;

    /// The id of `entity`, if it has been persisted.
    fn id_of<T: Entity>(&self, entity: &T) -> Option<u64> {
        entity.id()
    }

    /// Name of the table backing `T`.
    fn table_name<T: Entity>(&self) -> String {
        T::KIND.to_string()
    }

    /// Number of rows in `table`.
    fn raw_count(&self, table: &str) -> Result<u64, Error>;
}

/// Entity database backed by sled.
pub struct Database {
    engine: StorageEngine,
}

impl Database {
    /// Open or create a database with the given configuration.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        Ok(Self {
            engine: StorageEngine::open(config)?,
        })
    }

}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.engine.flush() {
            warn!(error = %e, "failed to flush database on close");
        }
    }
}

impl EntityStore for Database {
    fn get<T: Entity>(&self, id: u64) -> Result<Option<T>, Error> {
        match self.engine.get(T::KIND, id)? {
            Some(record) => Ok(Some(entity::decode(&record.data)?)),
            None => Ok(None),
        }
    }

    fn put<T: Entity>(&self, entity: &mut T) -> Result<u64, Error> {
        let id = match entity.id() {
            Some(id) => id,
            None => {
                let id = self.engine.next_id()?;
                entity.set_id(id);
                id
            }
        };
        // Encode after the id is set so the stored document carries it.
        let data = entity::encode(entity)?;
        self.engine.put(T::KIND, Some(id), data)?;
        trace!(kind = T::KIND, id, "entity stored");
        Ok(id)
    }

    fn delete<T: Entity>(&self, entity: &T) -> Result<bool, Error> {
        // An entity that was never saved has no row to remove.
        let Some(id) = entity.id() else {
            return Ok(false);
        };
        self.engine.delete(T::KIND, id)
    }

    fn delete_by_id<T: Entity>(&self, id: u64) -> Result<bool, Error> {
        self.engine.delete(T::KIND, id)
    }

    fn query_all<T: Entity>(&self, query: &Query) -> Result<EntityCursor<T>, Error> {
        Ok(Box::new(self.engine.scan::<T>(query)?))
    }

    fn raw_count(&self, table: &str) -> Result<u64, Error> {
        self.engine.count(table)
    }
}
