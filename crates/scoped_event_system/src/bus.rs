//! The host platform bus boundary, plus an in-memory implementation.
//!
//! The engine consumes the host bus as an abstract capability: register a
//! callback for an event type at a phase, with a before-modifications flag,
//! tied to an owner identity. [`MemoryEventBus`] is a complete in-process
//! implementation used by the integration tests and usable as a default host
//! adapter when no external platform is involved.

use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use compact_str::CompactString;
use dashmap::DashMap;
use tracing::debug;

use crate::event::{Event, EventPhase};
use crate::hierarchy::{hierarchy_ids, TypeNode};

/// Type-erased platform callback.
pub type BusCallback = Arc<dyn Fn(&dyn Event) + Send + Sync>;

/// The multiplexing key: at most one platform subscription exists per key,
/// per registry, at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformKey {
    pub event: TypeId,
    pub phase: EventPhase,
    pub before_modifications: bool,
}

impl PlatformKey {
    pub fn new(event: TypeNode, phase: EventPhase, before_modifications: bool) -> Self {
        Self {
            event: event.id(),
            phase,
            before_modifications,
        }
    }
}

/// Opaque handle identifying one platform subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    /// Wraps a bus-assigned raw id. Only bus implementations mint handles.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Owner identity a subscription is tied to (typically a plugin name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerId(CompactString);

impl OwnerId {
    pub fn new(name: &str) -> Self {
        Self(CompactString::new(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OwnerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for OwnerId {
    fn from(name: String) -> Self {
        Self(CompactString::from(name))
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Abstract host event bus.
///
/// Publication is driven by external code; the engine only subscribes and
/// unsubscribes. Implementations must tolerate re-entrant publication from
/// inside a callback.
pub trait EventBus: Send + Sync + 'static {
    /// Registers a callback for `event` at `phase`, before/after
    /// modifications, tied to `owner`.
    fn subscribe(
        &self,
        event: TypeNode,
        phase: EventPhase,
        before_modifications: bool,
        owner: OwnerId,
        callback: BusCallback,
    ) -> SubscriptionHandle;

    /// Removes a subscription. Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}

struct BusSubscription {
    handle: SubscriptionHandle,
    #[allow(dead_code)]
    owner: OwnerId,
    callback: BusCallback,
}

/// In-process event bus backed by concurrent maps.
///
/// Publishing fires phases in order, before-modifications subscriptions
/// first within each phase, and delivers an event to subscriptions
/// registered for any ancestor of the event's runtime type. Within one key,
/// registration order is preserved.
pub struct MemoryEventBus {
    subscriptions: DashMap<PlatformKey, Vec<BusSubscription>>,
    handle_index: DashMap<SubscriptionHandle, PlatformKey>,
    next_handle: AtomicU64,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
            handle_index: DashMap::new(),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Delivers `event` synchronously to every matching subscription.
    ///
    /// Callbacks run on the calling thread; the callback list is snapshotted
    /// per key so re-entrant subscribe/unsubscribe calls cannot deadlock.
    pub fn publish(&self, event: &dyn Event) {
        let ids = hierarchy_ids(event.node());
        for phase in EventPhase::ALL {
            for before_modifications in [true, false] {
                let mut callbacks: Vec<BusCallback> = Vec::new();
                for id in &ids {
                    let key = PlatformKey {
                        event: *id,
                        phase,
                        before_modifications,
                    };
                    if let Some(subs) = self.subscriptions.get(&key) {
                        callbacks.extend(subs.iter().map(|s| s.callback.clone()));
                    }
                }
                for callback in callbacks {
                    callback(event);
                }
            }
        }
    }

    /// Number of live subscriptions across all keys.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.iter().map(|entry| entry.len()).sum()
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for MemoryEventBus {
    fn subscribe(
        &self,
        event: TypeNode,
        phase: EventPhase,
        before_modifications: bool,
        owner: OwnerId,
        callback: BusCallback,
    ) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let key = PlatformKey::new(event, phase, before_modifications);
        debug!(event = event.name(), ?phase, before_modifications, %owner, "bus subscription created");
        self.subscriptions.entry(key).or_default().push(BusSubscription {
            handle,
            owner,
            callback,
        });
        self.handle_index.insert(handle, key);
        handle
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        let Some((_, key)) = self.handle_index.remove(&handle) else {
            return;
        };
        if let Some(mut subs) = self.subscriptions.get_mut(&key) {
            subs.retain(|s| s.handle != handle);
        }
        self.subscriptions.remove_if(&key, |_, subs| subs.is_empty());
        debug!(?key, "bus subscription removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_event;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct BaseEvent;
    #[derive(Debug)]
    struct DerivedEvent;

    impl_event!(BaseEvent);
    impl_event!(DerivedEvent: BaseEvent);

    fn recording_callback(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> BusCallback {
        let log = log.clone();
        Arc::new(move |_event| log.lock().unwrap().push(tag))
    }

    #[test]
    fn test_publish_fires_phases_in_order() {
        let bus = MemoryEventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(
            BaseEvent::event_node(),
            EventPhase::Last,
            false,
            "test".into(),
            recording_callback(&log, "last"),
        );
        bus.subscribe(
            BaseEvent::event_node(),
            EventPhase::First,
            false,
            "test".into(),
            recording_callback(&log, "first"),
        );
        bus.subscribe(
            BaseEvent::event_node(),
            EventPhase::First,
            true,
            "test".into(),
            recording_callback(&log, "first_before"),
        );

        bus.publish(&BaseEvent);
        assert_eq!(*log.lock().unwrap(), vec!["first_before", "first", "last"]);
    }

    #[test]
    fn test_publish_reaches_ancestor_subscriptions() {
        let bus = MemoryEventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(
            BaseEvent::event_node(),
            EventPhase::Default,
            false,
            "test".into(),
            recording_callback(&log, "base"),
        );

        bus.publish(&DerivedEvent);
        assert_eq!(*log.lock().unwrap(), vec!["base"]);
    }

    #[test]
    fn test_unsubscribe_removes_subscription() {
        let bus = MemoryEventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let handle = bus.subscribe(
            BaseEvent::event_node(),
            EventPhase::Default,
            false,
            "test".into(),
            recording_callback(&log, "base"),
        );
        assert_eq!(bus.subscription_count(), 1);

        bus.unsubscribe(handle);
        assert_eq!(bus.subscription_count(), 0);

        bus.publish(&BaseEvent);
        assert!(log.lock().unwrap().is_empty());

        // Unknown handles are ignored.
        bus.unsubscribe(handle);
    }
}
