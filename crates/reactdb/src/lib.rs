//! reactdb - an embedded entity store with live change streams.
//!
//! [`ReactiveStore`] wraps an [`EntityStore`] and publishes a [`ChangeEvent`]
//! after every successful insert, update or delete. Subscribers observe the
//! events through [`ReactiveStore::changes`] or, filtered by entity kind,
//! through [`ReactiveStore::changes_of`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use reactdb::{Database, Entity, ReactiveStore, StorageConfig};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Person {
//!     id: Option<u64>,
//!     name: String,
//! }
//!
//! impl Entity for Person {
//!     const KIND: &'static str = "Person";
//!     fn id(&self) -> Option<u64> { self.id }
//!     fn set_id(&mut self, id: u64) { self.id = Some(id); }
//! }
//!
//! # fn main() -> reactdb::Result<()> {
//! let db = Database::open(StorageConfig::new("./people"))?;
//! let store = ReactiveStore::new(Arc::new(db));
//!
//! let mut people = store.changes_of::<Person>();
//! let mut ada = Person { id: None, name: "Ada".into() };
//! store.save(&mut ada)?;
//!
//! let event = people.try_recv().expect("insert event");
//! assert_eq!(event.entity().name, "Ada");
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod deferred;
pub mod event;
pub mod kind;
pub mod results;
pub mod store;

pub use bus::Subscription;
pub use deferred::{Deferred, DeferredFuture};
pub use event::{ChangeEvent, ChangeKind, RawChange};
pub use kind::{AnyEntity, EntityKind, KindRegistry};
pub use results::QueryResults;
pub use store::{EntityQuery, ReactiveStore};

/// Re-export of the storage collaborator types.
pub use reactdb_core::{
    CompareOp, Cursor, Database, Entity, EntityCursor, EntityStore, Error, Filter, Query,
    StorageConfig,
};

/// Result type used throughout the reactive layer.
pub type Result<T> = std::result::Result<T, Error>;

/// Re-export of the core crate.
pub use reactdb_core as core;
