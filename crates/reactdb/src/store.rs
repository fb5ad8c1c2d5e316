//! Reactive store: storage operations that publish change events.

use std::marker::PhantomData;
use std::sync::Arc;

use reactdb_core::{Entity, EntityStore, Filter, Query};
use tracing::debug;

use crate::bus::{ChangeBus, Subscription};
use crate::deferred::Deferred;
use crate::event::ChangeEvent;
use crate::kind::{AnyEntity, KindRegistry};
use crate::results::QueryResults;
use crate::Result;

/// Entity store whose mutations are observable as change events.
///
/// Every mutating call runs the storage operation first and publishes one
/// event only after it succeeds. Reads never publish. Cloning is cheap and
/// yields a handle sharing the same storage and change bus.
pub struct ReactiveStore<S> {
    storage: Arc<S>,
    bus: ChangeBus,
}

impl<S> Clone for ReactiveStore<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            bus: self.bus.clone(),
        }
    }
}

impl<S: EntityStore + 'static> ReactiveStore<S> {
    /// Create a store over shared storage, with a fresh change bus.
    pub fn new(storage: Arc<S>) -> Self {
        Self::with_registry(storage, Arc::new(KindRegistry::new()))
    }

    /// Create a store whose filtered subscriptions use `registry`.
    pub fn with_registry(storage: Arc<S>, registry: Arc<KindRegistry>) -> Self {
        Self {
            storage,
            bus: ChangeBus::with_registry(registry),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Declare `Sub` a subtype of `Super` for filtered subscriptions.
    pub fn register_subtype<Sub, Super>(&self) -> &Self
    where
        Sub: Entity + Into<Super>,
        Super: Entity,
    {
        self.bus.registry().register::<Sub, Super>();
        self
    }

    /// Every change event, unfiltered.
    pub fn changes(&self) -> Subscription<AnyEntity> {
        self.bus.subscribe_all()
    }

    /// Change events for `T` and its registered subtypes.
    pub fn changes_of<T: Entity>(&self) -> Subscription<T> {
        self.bus.subscribe::<T>()
    }

    pub fn has_subscribers(&self) -> bool {
        self.bus.has_subscribers()
    }

    /// Insert or update `entity`.
    ///
    /// An entity without an id is inserted and receives the id storage
    /// assigns; one with an id is updated in place. Returns the entity's id.
    pub fn save<T: Entity>(&self, entity: &mut T) -> Result<u64> {
        // Storage may assign the id while saving, so classify first.
        let existing = self.storage.id_of(entity);
        let stored = self.storage.put(entity)?;

        match existing {
            None => {
                debug!(kind = T::KIND, id = stored, "entity inserted");
                self.bus.publish(ChangeEvent::insert(stored, entity.clone()));
                Ok(stored)
            }
            Some(id) => {
                debug!(kind = T::KIND, id, "entity updated");
                self.bus.publish(ChangeEvent::update(id, entity.clone()));
                Ok(id)
            }
        }
    }

    /// Deferred [`save`](Self::save) yielding the saved entity.
    pub fn save_lazy<T: Entity>(&self, mut entity: T) -> Deferred<T> {
        let store = self.clone();
        Deferred::new(move || {
            store.save(&mut entity)?;
            Ok(entity)
        })
    }

    /// Delete `entity`. Publishes only when a row was removed.
    ///
    /// An entity that was never saved removes nothing and returns `false`.
    pub fn delete<T: Entity>(&self, entity: &T) -> Result<bool> {
        let id = self.storage.id_of(entity);
        let deleted = self.storage.delete(entity)?;
        if deleted {
            self.publish_delete(id, entity.clone());
        }
        Ok(deleted)
    }

    /// Deferred [`delete`](Self::delete) yielding the entity.
    pub fn delete_lazy<T: Entity>(&self, entity: T) -> Deferred<T> {
        let store = self.clone();
        Deferred::new(move || {
            store.delete(&entity)?;
            Ok(entity)
        })
    }

    /// Delete the `T` row with `id`. Returns whether a row was removed.
    ///
    /// With active subscribers the row is read first so the delete event can
    /// carry it. Without subscribers the row is deleted directly.
    pub fn delete_by_id<T: Entity>(&self, id: u64) -> Result<bool> {
        if !self.bus.has_subscribers() {
            return self.storage.delete_by_id::<T>(id);
        }

        match self.storage.get::<T>(id)? {
            Some(snapshot) => {
                let deleted = self.storage.delete(&snapshot)?;
                if deleted {
                    self.publish_delete(Some(id), snapshot);
                }
                Ok(deleted)
            }
            None => Ok(false),
        }
    }

    fn publish_delete<T: Entity>(&self, id: Option<u64>, entity: T) {
        debug!(kind = T::KIND, id = ?id, "entity deleted");
        self.bus.publish(ChangeEvent::delete(id, entity));
    }

    /// Deferred point lookup. A missing row yields `None`.
    pub fn get<T: Entity>(&self, id: u64) -> Deferred<Option<T>> {
        let storage = Arc::clone(&self.storage);
        Deferred::new(move || storage.get::<T>(id))
    }

    /// Lazily iterate all `T` rows, or those matching `selection`.
    ///
    /// `selection` uses positional `?` placeholders bound to `args`.
    pub fn query<T: Entity>(&self, selection: Option<&str>, args: &[&str]) -> Result<QueryResults<T>> {
        let mut query = self.build_query::<T>();
        if let Some(selection) = selection {
            query = query.with_selection(selection, args)?;
        }
        self.query_with(&query)
    }

    /// Start a query over `T` to refine and pass to [`query_with`](Self::query_with).
    pub fn build_query<T: Entity>(&self) -> EntityQuery<T> {
        EntityQuery {
            query: Query::new(self.storage.table_name::<T>()),
            _entity: PhantomData,
        }
    }

    /// Lazily iterate the rows matching a prepared query.
    pub fn query_with<T: Entity>(&self, query: &EntityQuery<T>) -> Result<QueryResults<T>> {
        let cursor = self.storage.query_all::<T>(&query.query)?;
        Ok(QueryResults::new(cursor, T::KIND))
    }

    /// Deferred row count of the table backing `T`.
    pub fn count<T: Entity>(&self) -> Deferred<u64> {
        let storage = Arc::clone(&self.storage);
        Deferred::new(move || {
            let table = storage.table_name::<T>();
            storage.raw_count(&table)
        })
    }

    /// [`save`](Self::save) as a callable, for wiring into pipelines.
    pub fn saver<T: Entity>(&self) -> impl Fn(&mut T) -> Result<u64> + Send + Sync + 'static {
        let store = self.clone();
        move |entity: &mut T| store.save(entity)
    }

    /// [`delete`](Self::delete) as a callable.
    pub fn deleter<T: Entity>(&self) -> impl Fn(&T) -> Result<bool> + Send + Sync + 'static {
        let store = self.clone();
        move |entity: &T| store.delete(entity)
    }

    /// [`delete_by_id`](Self::delete_by_id) as a callable.
    pub fn deleter_by_id<T: Entity>(&self) -> impl Fn(u64) -> Result<bool> + Send + Sync + 'static {
        let store = self.clone();
        move |id: u64| store.delete_by_id::<T>(id)
    }
}

/// A query bound to the entity type it yields.
#[derive(Debug, Clone)]
pub struct EntityQuery<T> {
    query: Query,
    _entity: PhantomData<fn() -> T>,
}

impl<T> EntityQuery<T> {
    /// Narrow with a filter, combined with any existing one using AND.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.query = self.query.filter(filter);
        self
    }

    /// Narrow with selection text and positional arguments.
    pub fn with_selection(mut self, selection: &str, args: &[&str]) -> Result<Self> {
        self.query = self.query.with_selection(selection, args)?;
        Ok(self)
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.query = self.query.offset(offset);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query = self.query.limit(limit);
        self
    }

    pub fn as_query(&self) -> &Query {
        &self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeKind;
    use reactdb_core::{Database, EntityCursor, Error, StorageConfig};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Person {
        id: Option<u64>,
        name: String,
    }

    impl Entity for Person {
        const KIND: &'static str = "Person";

        fn id(&self) -> Option<u64> {
            self.id
        }

        fn set_id(&mut self, id: u64) {
            self.id = Some(id);
        }
    }

    fn person(name: &str) -> Person {
        Person {
            id: None,
            name: name.into(),
        }
    }

    /// Database wrapper counting storage calls, with switchable write failures
    /// and an option to stop reporting entity ids.
    struct CountingStore {
        db: Database,
        gets: AtomicUsize,
        deletes: AtomicUsize,
        fail_writes: AtomicBool,
        hide_ids: AtomicBool,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                db: Database::open(StorageConfig::temporary()).unwrap(),
                gets: AtomicUsize::new(0),
                deletes: AtomicUsize::new(0),
                fail_writes: AtomicBool::new(false),
                hide_ids: AtomicBool::new(false),
            }
        }

        fn check_writable(&self) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::Serialization("storage is read-only".into()));
            }
            Ok(())
        }
    }

    impl EntityStore for CountingStore {
        fn get<T: Entity>(&self, id: u64) -> Result<Option<T>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.db.get(id)
        }

        fn put<T: Entity>(&self, entity: &mut T) -> Result<u64> {
            self.check_writable()?;
            self.db.put(entity)
        }

        fn delete<T: Entity>(&self, entity: &T) -> Result<bool> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.check_writable()?;
            self.db.delete(entity)
        }

        fn delete_by_id<T: Entity>(&self, id: u64) -> Result<bool> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.check_writable()?;
            self.db.delete_by_id::<T>(id)
        }

        fn query_all<T: Entity>(&self, query: &Query) -> Result<EntityCursor<T>> {
            self.db.query_all(query)
        }

        fn id_of<T: Entity>(&self, entity: &T) -> Option<u64> {
            if self.hide_ids.load(Ordering::SeqCst) {
                return None;
            }
            entity.id()
        }

        fn raw_count(&self, table: &str) -> Result<u64> {
            self.db.raw_count(table)
        }
    }

    fn store() -> ReactiveStore<CountingStore> {
        ReactiveStore::new(Arc::new(CountingStore::new()))
    }

    #[test]
    fn test_save_publishes_insert_then_update() {
        let store = store();
        let mut changes = store.changes_of::<Person>();

        let mut ada = person("A");
        let id = store.save(&mut ada).unwrap();
        assert_eq!(ada.id, Some(id));

        ada.name = "B".into();
        assert_eq!(store.save(&mut ada).unwrap(), id);

        let events = changes.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), ChangeKind::Insert);
        assert_eq!(events[0].id(), Some(id));
        assert_eq!(events[0].entity().name, "A");
        assert_eq!(events[1].kind(), ChangeKind::Update);
        assert_eq!(events[1].id(), Some(id));
        assert_eq!(events[1].entity().name, "B");
    }

    #[test]
    fn test_failed_save_publishes_nothing() {
        let store = store();
        let mut changes = store.changes();
        store.storage().fail_writes.store(true, Ordering::SeqCst);

        let mut ada = person("Ada");
        assert!(store.save(&mut ada).is_err());
        assert!(ada.id.is_none());
        assert!(changes.try_recv().is_none());
    }

    #[test]
    fn test_delete_publishes_only_when_removed() {
        let store = store();
        let mut ada = person("Ada");
        store.save(&mut ada).unwrap();

        let mut changes = store.changes_of::<Person>();
        assert!(store.delete(&ada).unwrap());
        assert!(!store.delete(&ada).unwrap());

        let events = changes.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), ChangeKind::Delete);
        assert_eq!(events[0].entity(), &ada);
    }

    #[test]
    fn test_delete_unsaved_entity_returns_false() {
        let store = store();
        let mut changes = store.changes();
        let unsaved = person("Ada");

        assert!(!store.delete(&unsaved).unwrap());
        assert!(!store.deleter::<Person>()(&unsaved).unwrap());
        assert_eq!(store.delete_lazy(unsaved.clone()).run().unwrap(), unsaved);
        assert!(changes.try_recv().is_none());
    }

    #[test]
    fn test_delete_published_when_storage_reports_no_id() {
        let store = store();
        let mut ada = person("Ada");
        store.save(&mut ada).unwrap();
        store.storage().hide_ids.store(true, Ordering::SeqCst);

        let mut changes = store.changes_of::<Person>();
        assert!(store.delete(&ada).unwrap());

        let event = changes.try_recv().unwrap();
        assert_eq!(event.kind(), ChangeKind::Delete);
        assert_eq!(event.id(), None);
        assert_eq!(event.entity(), &ada);
    }

    #[test]
    fn test_events_only_follow_storage_mutations() {
        let store = store();
        let mut changes = store.changes_of::<Person>();

        let mut ada = person("Ada");
        store.save(&mut ada).unwrap();
        store.get::<Person>(ada.id.unwrap()).run().unwrap();
        store.count::<Person>().run().unwrap();
        drop(store.save_lazy(person("Bob")));

        let events = changes.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(store.count::<Person>().run().unwrap(), 1);
    }

    #[test]
    fn test_delete_by_id_without_subscribers_skips_read() {
        let store = store();
        let mut ada = person("Ada");
        let id = store.save(&mut ada).unwrap();

        assert!(store.delete_by_id::<Person>(id).unwrap());
        assert_eq!(store.storage().gets.load(Ordering::SeqCst), 0);
        assert_eq!(store.storage().deletes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delete_by_id_with_subscriber_reads_snapshot() {
        let store = store();
        let mut ada = person("Ada");
        let id = store.save(&mut ada).unwrap();

        let mut changes = store.changes();
        assert!(store.delete_by_id::<Person>(id).unwrap());
        assert_eq!(store.storage().gets.load(Ordering::SeqCst), 1);

        let event = changes.try_recv().unwrap();
        assert_eq!(event.kind(), ChangeKind::Delete);
        assert_eq!(event.id(), Some(id));
        let snapshot = event.downcast::<Person>().unwrap();
        assert_eq!(snapshot.entity().name, "Ada");
        assert!(changes.try_recv().is_none());
    }

    #[test]
    fn test_delete_by_id_missing_row() {
        let store = store();
        let mut changes = store.changes();
        assert!(!store.delete_by_id::<Person>(404).unwrap());
        assert!(changes.try_recv().is_none());
    }

    #[test]
    fn test_lazy_operations_wait_until_run() {
        let store = store();
        let mut changes = store.changes_of::<Person>();

        let pending = store.save_lazy(person("Ada"));
        assert!(changes.try_recv().is_none());
        assert_eq!(store.count::<Person>().run().unwrap(), 0);

        let saved = pending.run().unwrap();
        assert!(saved.id.is_some());
        assert_eq!(changes.try_recv().unwrap().kind(), ChangeKind::Insert);

        drop(store.delete_lazy(saved.clone()));
        assert_eq!(store.count::<Person>().run().unwrap(), 1);
        assert!(changes.try_recv().is_none());

        store.delete_lazy(saved).run().unwrap();
        assert_eq!(changes.try_recv().unwrap().kind(), ChangeKind::Delete);
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = store();
        let mut ada = person("Ada");
        let id = store.save(&mut ada).unwrap();

        assert_eq!(store.get::<Person>(id).run().unwrap(), Some(ada));
        assert_eq!(store.get::<Person>(id + 1000).run().unwrap(), None);
    }

    #[test]
    fn test_callables() {
        let store = store();
        let mut changes = store.changes_of::<Person>();
        let save = store.saver::<Person>();
        let delete = store.deleter::<Person>();
        let delete_by_id = store.deleter_by_id::<Person>();

        let mut ada = person("Ada");
        let mut bob = person("Bob");
        save(&mut ada).unwrap();
        let bob_id = save(&mut bob).unwrap();
        assert!(delete(&ada).unwrap());
        assert!(delete_by_id(bob_id).unwrap());

        let kinds: Vec<ChangeKind> = changes.drain().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::Insert,
                ChangeKind::Insert,
                ChangeKind::Delete,
                ChangeKind::Delete
            ]
        );
    }

    #[test]
    fn test_query_does_not_publish() {
        let store = store();
        for name in ["Ada", "Bob", "Cy"] {
            store.save(&mut person(name)).unwrap();
        }

        let mut changes = store.changes();
        let names: Vec<String> = store
            .query::<Person>(Some("name != ?"), &["Bob"])
            .unwrap()
            .map(|p| p.unwrap().name)
            .collect();
        assert_eq!(names, vec!["Ada", "Cy"]);
        assert!(changes.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_awaiting_deferred_operations() {
        let store = store();
        let saved = store.save_lazy(person("Ada")).await.unwrap();
        let found = store.get::<Person>(saved.id.unwrap()).await.unwrap();
        assert_eq!(found, Some(saved));
        assert_eq!(store.count::<Person>().await.unwrap(), 1);
    }
}
