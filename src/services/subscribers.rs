//! Subscriber registry owned by the event bus
//!
//! Entries are keyed by event type and identified by a monotonic
//! `SubscriptionId`, so registering the same closure twice yields two
//! independent subscriptions.

use crate::domain::envelope::{EventEnvelope, EventType};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Subscriber callback
pub type Handler = Arc<dyn Fn(&EventEnvelope) -> anyhow::Result<()> + Send + Sync>;

/// Snapshot of the handlers for one type, taken at delivery time
pub(crate) type HandlerSnapshot = SmallVec<[(SubscriptionId, Handler); 4]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default)]
pub struct SubscriberRegistry {
    entries: Mutex<FxHashMap<EventType, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, event_type: EventType, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().entry(event_type).or_default().push((id, handler));
        id
    }

    /// Remove one registration. Returns false if it was already gone.
    pub(crate) fn remove(&self, event_type: &EventType, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock();
        let Some(handlers) = entries.get_mut(event_type) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            entries.remove(event_type);
        }
        removed
    }

    /// Copy out the current handlers so delivery runs without the lock held
    pub(crate) fn snapshot(&self, event_type: &EventType) -> HandlerSnapshot {
        self.entries
            .lock()
            .get(event_type)
            .map(|handlers| handlers.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, event_type: &EventType) -> usize {
        self.entries.lock().get(event_type).map_or(0, Vec::len)
    }
}

/// Handle returned by `subscribe`
///
/// Dropping the handle leaves the subscription in place; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "dropping a Subscription does not unsubscribe; keep it to cancel later"]
pub struct Subscription {
    registry: Weak<SubscriberRegistry>,
    event_type: EventType,
    id: SubscriptionId,
}

impl Subscription {
    pub(crate) fn new(registry: &Arc<SubscriberRegistry>, event_type: EventType, id: SubscriptionId) -> Self {
        Self { registry: Arc::downgrade(registry), event_type, id }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// Remove exactly this registration. Repeated calls are no-ops.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = registry.remove(&self.event_type, self.id);
        if removed {
            debug!(event_type = %self.event_type, subscription_id = %self.id, "event_bus_unsubscribed");
        }
        removed
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event_type", &self.event_type)
            .field("id", &self.id)
            .finish()
    }
}
