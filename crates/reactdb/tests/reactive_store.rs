//! Integration tests for the reactive store over a sled-backed database.

use std::sync::Arc;

use reactdb::{ChangeKind, Database, Entity, Filter, ReactiveStore, StorageConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Person {
    id: Option<u64>,
    name: String,
    age: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Employee {
    id: Option<u64>,
    name: String,
    age: u32,
    company: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Car {
    id: Option<u64>,
    plate: String,
}

impl From<Employee> for Person {
    fn from(e: Employee) -> Self {
        Person {
            id: e.id,
            name: e.name,
            age: e.age,
        }
    }
}

macro_rules! impl_entity {
    ($ty:ty, $kind:literal) => {
        impl Entity for $ty {
            const KIND: &'static str = $kind;

            fn id(&self) -> Option<u64> {
                self.id
            }

            fn set_id(&mut self, id: u64) {
                self.id = Some(id);
            }
        }
    };
}

impl_entity!(Person, "Person");
impl_entity!(Employee, "Employee");
impl_entity!(Car, "Car");

fn person(name: &str, age: u32) -> Person {
    Person {
        id: None,
        name: name.to_string(),
        age,
    }
}

struct TestContext {
    store: ReactiveStore<Database>,
    _dir: tempfile::TempDir,
}

impl TestContext {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(StorageConfig::new(dir.path())).unwrap();
        Self {
            store: ReactiveStore::new(Arc::new(db)),
            _dir: dir,
        }
    }
}

#[test]
fn test_count_is_per_kind() {
    let ctx = TestContext::new();
    for (name, age) in [("Ada", 36), ("Bob", 41), ("Cy", 29)] {
        ctx.store.save(&mut person(name, age)).unwrap();
    }
    ctx.store
        .save(&mut Car {
            id: None,
            plate: "RX-1".into(),
        })
        .unwrap();

    assert_eq!(ctx.store.count::<Person>().run().unwrap(), 3);
    assert_eq!(ctx.store.count::<Car>().run().unwrap(), 1);
    assert_eq!(ctx.store.count::<Employee>().run().unwrap(), 0);
}

#[test]
fn test_subtype_changes_reach_supertype_subscribers() {
    let ctx = TestContext::new();
    ctx.store.register_subtype::<Employee, Person>();

    let mut people = ctx.store.changes_of::<Person>();
    let mut cars = ctx.store.changes_of::<Car>();

    let mut grace = Employee {
        id: None,
        name: "Grace".into(),
        age: 45,
        company: "Navy".into(),
    };
    let id = ctx.store.save(&mut grace).unwrap();
    ctx.store.save(&mut person("Ada", 36)).unwrap();

    let events = people.drain();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id(), Some(id));
    assert_eq!(events[0].entity_kind().name(), "Employee");
    assert_eq!(events[0].entity().name, "Grace");
    assert_eq!(events[1].entity_kind().name(), "Person");
    assert!(cars.try_recv().is_none());
}

#[test]
fn test_unfiltered_subscription_sees_all_kinds_in_order() {
    let ctx = TestContext::new();
    let mut all = ctx.store.changes();

    let mut ada = person("Ada", 36);
    ctx.store.save(&mut ada).unwrap();
    let mut car = Car {
        id: None,
        plate: "RX-1".into(),
    };
    ctx.store.save(&mut car).unwrap();
    ctx.store.delete(&ada).unwrap();

    let events = all.drain();
    let summary: Vec<(ChangeKind, &str)> = events
        .iter()
        .map(|e| (e.kind(), e.entity_kind().name()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (ChangeKind::Insert, "Person"),
            (ChangeKind::Insert, "Car"),
            (ChangeKind::Delete, "Person"),
        ]
    );
    assert_eq!(events[1].downcast::<Car>().unwrap().entity(), &car);
    assert!(events[1].downcast::<Person>().is_none());
}

#[test]
fn test_query_with_selection_and_prepared_query() {
    let ctx = TestContext::new();
    for (name, age) in [("Ada", 36), ("Bob", 41), ("Cy", 29), ("Dee", 52)] {
        ctx.store.save(&mut person(name, age)).unwrap();
    }

    let names: Vec<String> = ctx
        .store
        .query::<Person>(Some("age > ? AND name <> ?"), &["30", "Dee"])
        .unwrap()
        .map(|p| p.unwrap().name)
        .collect();
    assert_eq!(names, vec!["Ada", "Bob"]);

    let query = ctx
        .store
        .build_query::<Person>()
        .filter(Filter::eq("age", 29).or(Filter::eq("age", 52)))
        .limit(1);
    let found: Vec<Person> = ctx
        .store
        .query_with(&query)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Cy");

    assert!(ctx
        .store
        .query::<Person>(Some("age > ?"), &[])
        .is_err());
}

#[test]
fn test_query_results_close_when_exhausted() {
    let ctx = TestContext::new();
    ctx.store.save(&mut person("Ada", 36)).unwrap();
    ctx.store.save(&mut person("Bob", 41)).unwrap();

    let mut results = ctx.store.query::<Person>(None, &[]).unwrap();
    assert!(results.next().is_some());
    assert!(!results.is_closed());
    assert!(results.next().is_some());
    assert!(results.next().is_none());
    assert!(results.is_closed());
    assert!(results.next().is_none());
}

#[test]
fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let db = Database::open(StorageConfig::new(dir.path())).unwrap();
        let store = ReactiveStore::new(Arc::new(db));
        store.save(&mut person("Ada", 36)).unwrap()
    };

    let db = Database::open(StorageConfig::new(dir.path())).unwrap();
    let store = ReactiveStore::new(Arc::new(db));
    let mut changes = store.changes();

    let found = store.get::<Person>(id).run().unwrap().unwrap();
    assert_eq!(found.name, "Ada");
    assert!(changes.try_recv().is_none());
}

#[tokio::test]
async fn test_subscriber_task_receives_changes() {
    use futures::StreamExt;

    let ctx = TestContext::new();
    let changes = ctx.store.changes_of::<Person>();

    let consumer = tokio::spawn(async move {
        changes
            .take(3)
            .map(|e| (e.kind(), e.entity().name.clone()))
            .collect::<Vec<_>>()
            .await
    });

    let mut ada = ctx.store.save_lazy(person("Ada", 36)).await.unwrap();
    ada.age += 1;
    ctx.store.save(&mut ada).unwrap();
    ctx.store.delete_lazy(ada).await.unwrap();

    let seen = consumer.await.unwrap();
    assert_eq!(
        seen,
        vec![
            (ChangeKind::Insert, "Ada".to_string()),
            (ChangeKind::Update, "Ada".to_string()),
            (ChangeKind::Delete, "Ada".to_string()),
        ]
    );
}

#[test]
fn test_subscription_from_another_thread() {
    let ctx = TestContext::new();
    let mut changes = ctx.store.changes_of::<Person>();

    let store = ctx.store.clone();
    let writer = std::thread::spawn(move || {
        for i in 0..10 {
            store.save(&mut person(&format!("p{i}"), i)).unwrap();
        }
    });

    let mut ids = Vec::new();
    while ids.len() < 10 {
        let event = changes.blocking_recv().unwrap();
        ids.push(event.id().unwrap());
    }
    writer.join().unwrap();

    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
    assert_eq!(ctx.store.count::<Person>().run().unwrap(), 10);
}
