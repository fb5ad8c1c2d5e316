//! Broadcast bus for change events.
//!
//! Each subscription owns an unbounded queue. Publishing enqueues the event on
//! every matching subscription from the caller's thread and never runs
//! subscriber code, so a slow or failing subscriber cannot affect the
//! publisher or its peers. There is no replay: a subscription only sees events
//! published after it was created.

use std::any::TypeId;
use std::collections::{BTreeMap, HashSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use reactdb_core::Entity;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::event::{ChangeEvent, RawChange};
use crate::kind::{AnyEntity, KindRegistry};

/// Converts a raw event into what a subscription yields.
type Project<T> = Box<dyn Fn(RawChange) -> Option<ChangeEvent<T>> + Send + Sync>;

struct Subscriber {
    sender: mpsc::UnboundedSender<RawChange>,
    /// Accepted kinds; `None` accepts everything.
    accepts: Option<HashSet<TypeId>>,
}

impl Subscriber {
    fn wants(&self, event: &RawChange) -> bool {
        match &self.accepts {
            Some(kinds) => kinds.contains(&event.entity_kind().type_id()),
            None => true,
        }
    }
}

struct BusInner {
    /// Active subscriptions in subscription order.
    subscribers: Mutex<BTreeMap<u64, Subscriber>>,
    /// Mirror of `subscribers.len()`, readable without the lock.
    active: AtomicUsize,
    next_id: AtomicU64,
}

impl BusInner {
    fn remove(&self, id: u64) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.remove(&id).is_some() {
            self.active.fetch_sub(1, Ordering::AcqRel);
            debug!(subscription_id = id, "subscription removed");
        }
    }
}

/// Multi-subscriber broadcast of change events.
///
/// Only the owning store publishes. Cloning yields another handle to the same
/// bus. When the last handle is dropped the bus is retired and every open
/// subscription ends.
#[derive(Clone)]
pub(crate) struct ChangeBus {
    inner: Arc<BusInner>,
    registry: Arc<KindRegistry>,
}

impl ChangeBus {
    /// Create a bus resolving filtered subscriptions against `registry`.
    pub(crate) fn with_registry(registry: Arc<KindRegistry>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(BTreeMap::new()),
                active: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
            }),
            registry,
        }
    }

    pub(crate) fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// Publish a typed event.
    pub(crate) fn publish<T: Entity>(&self, event: ChangeEvent<T>) {
        self.publish_raw(event.erase());
    }

    /// Deliver `event` to every matching subscription, in subscription order.
    ///
    /// The registry lock is held while enqueueing. Enqueueing never blocks
    /// and never runs subscriber code, and holding the lock gives every
    /// subscription the same global event order under concurrent publishers.
    /// Subscriptions whose receiving side is gone are pruned.
    pub(crate) fn publish_raw(&self, event: RawChange) {
        let mut subscribers = self.inner.subscribers.lock();
        let mut delivered = 0usize;
        let mut dead = Vec::new();

        for (id, subscriber) in subscribers.iter() {
            if !subscriber.wants(&event) {
                continue;
            }
            if subscriber.sender.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*id);
            }
        }

        for id in dead {
            if subscribers.remove(&id).is_some() {
                self.inner.active.fetch_sub(1, Ordering::AcqRel);
                debug!(subscription_id = id, "pruned closed subscription");
            }
        }
        drop(subscribers);

        trace!(
            change = ?event.kind(),
            entity_kind = %event.entity_kind(),
            id = ?event.id(),
            delivered,
            "published change event"
        );
    }

    /// Subscribe to every event.
    pub(crate) fn subscribe_all(&self) -> Subscription<AnyEntity> {
        self.register(None, Box::new(|raw: RawChange| Some(raw)))
    }

    /// Subscribe to events of `T` and of its registered subtypes.
    ///
    /// Subtype payloads are converted to `T`; the event keeps the kind tag it
    /// was published with.
    pub(crate) fn subscribe<T: Entity>(&self) -> Subscription<T> {
        let compatibility = self.registry.resolve::<T>();
        let accepts = compatibility.type_ids().collect();
        self.register(
            Some(accepts),
            Box::new(move |raw: RawChange| {
                let kind = raw.entity_kind();
                let entity = compatibility.cast(&kind, &**raw.entity())?;
                Some(raw.with_entity(entity))
            }),
        )
    }

    fn register<T>(&self, accepts: Option<HashSet<TypeId>>, project: Project<T>) -> Subscription<T> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut subscribers = self.inner.subscribers.lock();
            subscribers.insert(id, Subscriber { sender, accepts });
            self.inner.active.fetch_add(1, Ordering::AcqRel);
        }
        debug!(subscription_id = id, "subscription created");

        Subscription {
            id,
            receiver,
            project,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Whether at least one subscription is active. Never blocks.
    pub(crate) fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }
}

/// A live feed of change events.
///
/// The feed never completes on its own; it ends when the bus is retired.
/// Dropping the subscription unsubscribes it.
pub struct Subscription<T> {
    id: u64,
    receiver: mpsc::UnboundedReceiver<RawChange>,
    project: Project<T>,
    bus: Weak<BusInner>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. Returns `None` once the bus is retired.
    pub async fn recv(&mut self) -> Option<ChangeEvent<T>> {
        loop {
            let raw = self.receiver.recv().await?;
            if let Some(event) = (self.project)(raw) {
                return Some(event);
            }
        }
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent<T>> {
        loop {
            let raw = self.receiver.try_recv().ok()?;
            if let Some(event) = (self.project)(raw) {
                return Some(event);
            }
        }
    }

    /// Block the current thread until the next event.
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<ChangeEvent<T>> {
        loop {
            let raw = self.receiver.blocking_recv()?;
            if let Some(event) = (self.project)(raw) {
                return Some(event);
            }
        }
    }

    /// Drain every event queued so far.
    pub fn drain(&mut self) -> Vec<ChangeEvent<T>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = ChangeEvent<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.receiver.poll_recv(cx) {
                Poll::Ready(Some(raw)) => {
                    if let Some(event) = (this.project)(raw) {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
