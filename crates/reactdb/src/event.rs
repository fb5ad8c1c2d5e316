//! Change events published after each completed mutation.

use std::sync::Arc;

use reactdb_core::Entity;

use crate::kind::{AnyEntity, EntityKind};

/// Classification of a completed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The entity had no id and was stored for the first time.
    Insert,
    /// The entity already had an id and was stored again.
    Update,
    /// The entity was removed.
    Delete,
}

/// An immutable notification of one completed mutation.
///
/// `entity_kind` is the kind the operation was invoked with. For deletes,
/// `entity` is the snapshot taken before the row was removed.
///
/// Events are only created by the store after storage confirms a mutation:
///
/// ```compile_fail
/// # use reactdb::{ChangeEvent, Entity};
/// # #[derive(Clone, serde::Serialize, serde::Deserialize)]
/// # struct Note { id: Option<u64> }
/// # impl Entity for Note {
/// #     const KIND: &'static str = "Note";
/// #     fn id(&self) -> Option<u64> { self.id }
/// #     fn set_id(&mut self, id: u64) { self.id = Some(id); }
/// # }
/// let forged = ChangeEvent::insert(1, Note { id: Some(1) });
/// ```
#[derive(Debug, Clone)]
pub struct ChangeEvent<T> {
    kind: ChangeKind,
    entity_kind: EntityKind,
    id: Option<u64>,
    entity: T,
}

/// A change event with its payload type erased.
pub type RawChange = ChangeEvent<AnyEntity>;

impl<T: Entity> ChangeEvent<T> {
    pub(crate) fn insert(id: u64, entity: T) -> Self {
        Self::new(ChangeKind::Insert, Some(id), entity)
    }

    pub(crate) fn update(id: u64, entity: T) -> Self {
        Self::new(ChangeKind::Update, Some(id), entity)
    }

    /// `id` is `None` when storage removed a row it cannot report an id for.
    pub(crate) fn delete(id: Option<u64>, entity: T) -> Self {
        Self::new(ChangeKind::Delete, id, entity)
    }

    fn new(kind: ChangeKind, id: Option<u64>, entity: T) -> Self {
        Self {
            kind,
            entity_kind: EntityKind::of::<T>(),
            id,
            entity,
        }
    }

    /// Erase the payload type for broadcast.
    pub(crate) fn erase(self) -> RawChange {
        ChangeEvent {
            kind: self.kind,
            entity_kind: self.entity_kind,
            id: self.id,
            entity: Arc::new(self.entity),
        }
    }
}

impl<T> ChangeEvent<T> {
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn entity_kind(&self) -> EntityKind {
        self.entity_kind
    }

    /// Id of the row the mutation touched. Always set for inserts and
    /// updates.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn entity(&self) -> &T {
        &self.entity
    }

    pub fn into_entity(self) -> T {
        self.entity
    }

    /// Replace the payload, keeping the classification and the original tag.
    pub(crate) fn with_entity<U>(&self, entity: U) -> ChangeEvent<U> {
        ChangeEvent {
            kind: self.kind,
            entity_kind: self.entity_kind,
            id: self.id,
            entity,
        }
    }
}

impl RawChange {
    /// Recover the typed event if the payload is exactly a `T`.
    pub fn downcast<T: Entity>(&self) -> Option<ChangeEvent<T>> {
        self.entity
            .downcast_ref::<T>()
            .map(|entity| self.with_entity(entity.clone()))
    }
}
