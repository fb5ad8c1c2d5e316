//! Entity kind tags and the subtype compatibility table.
//!
//! Every change event carries the [`EntityKind`] of the type it was saved or
//! deleted as. Filtered subscriptions are covariant: subscribing to a kind
//! also delivers events for its registered subtypes, converted to the
//! subscribed type. Compatibility is resolved once, when a subscription is
//! created.

use std::any::{Any, TypeId};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;
use reactdb_core::Entity;

/// Type-erased entity payload shared between subscribers.
pub type AnyEntity = Arc<dyn Any + Send + Sync>;

/// Runtime tag of an entity type.
///
/// Two kinds are equal when they tag the same Rust type.
#[derive(Clone, Copy)]
pub struct EntityKind {
    name: &'static str,
    type_id: TypeId,
}

impl EntityKind {
    /// The kind of `T`.
    pub fn of<T: Entity>() -> Self {
        Self {
            name: T::KIND,
            type_id: TypeId::of::<T>(),
        }
    }

    /// The kind name declared by the entity type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Whether this kind tags exactly `T`.
    pub fn is<T: Entity>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl PartialEq for EntityKind {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for EntityKind {}

impl Hash for EntityKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityKind").field(&self.name).finish()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Converts a payload of a subtype into its direct supertype.
type Upcast = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Option<AnyEntity> + Send + Sync>;

/// Converts a payload of a compatible kind into `T`.
type Cast<T> = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Option<T> + Send + Sync>;

/// Subtype relations between entity kinds.
#[derive(Default)]
pub struct KindRegistry {
    /// Supertype -> its direct subtypes and their conversions.
    subtypes: DashMap<TypeId, Vec<(EntityKind, Upcast)>>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `Sub` a subtype of `Super`.
    ///
    /// Subscriptions to `Super` created afterwards also receive events for
    /// `Sub` (and its own registered subtypes), converted with `Into`.
    /// Registering the same pair twice has no further effect.
    pub fn register<Sub, Super>(&self)
    where
        Sub: Entity + Into<Super>,
        Super: Entity,
    {
        let sub = EntityKind::of::<Sub>();
        let mut direct = self.subtypes.entry(TypeId::of::<Super>()).or_default();
        if direct.iter().any(|(kind, _)| *kind == sub) {
            return;
        }

        let upcast: Upcast = Arc::new(|payload| {
            payload
                .downcast_ref::<Sub>()
                .map(|entity| Arc::new(Into::<Super>::into(entity.clone())) as AnyEntity)
        });
        direct.push((sub, upcast));
    }

    /// Resolve every kind compatible with `T`, with a conversion into `T`.
    pub(crate) fn resolve<T: Entity>(&self) -> Compatibility<T> {
        let identity: Cast<T> = Arc::new(|payload| payload.downcast_ref::<T>().cloned());
        let mut casts: HashMap<TypeId, Cast<T>> = HashMap::new();
        casts.insert(TypeId::of::<T>(), identity.clone());

        let mut queue = VecDeque::from([(TypeId::of::<T>(), identity)]);
        while let Some((current, to_target)) = queue.pop_front() {
            for (kind, upcast) in self.direct_subtypes(current) {
                if casts.contains_key(&kind.type_id) {
                    continue;
                }
                let to_current = to_target.clone();
                let cast: Cast<T> = Arc::new(move |payload| {
                    let parent = upcast(payload)?;
                    to_current(&*parent)
                });
                casts.insert(kind.type_id, cast.clone());
                queue.push_back((kind.type_id, cast));
            }
        }

        Compatibility { casts }
    }

    fn direct_subtypes(&self, sup: TypeId) -> Vec<(EntityKind, Upcast)> {
        self.subtypes
            .get(&sup)
            .map(|direct| direct.clone())
            .unwrap_or_default()
    }
}

impl fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindRegistry")
            .field("supertypes", &self.subtypes.len())
            .finish()
    }
}

/// The set of kinds a subscription to `T` accepts.
pub(crate) struct Compatibility<T> {
    casts: HashMap<TypeId, Cast<T>>,
}

impl<T> Compatibility<T> {
    /// Type ids of every accepted kind.
    pub(crate) fn type_ids(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.casts.keys().copied()
    }

    /// Convert a payload tagged with `kind` into `T`.
    pub(crate) fn cast(&self, kind: &EntityKind, payload: &(dyn Any + Send + Sync)) -> Option<T> {
        self.casts.get(&kind.type_id).and_then(|cast| cast(payload))
    }
}
