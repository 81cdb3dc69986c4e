//! Deduplication of platform registrations.
//!
//! For each (event type, phase, before-modifications) key the multiplexer
//! holds exactly one platform subscription and a reference-counted set of
//! logical listeners feeding it. The platform subscription is torn down when
//! the set becomes empty. Listeners whose event type has no resolvable
//! mapping are tracked separately so a containing registry can activate them
//! later.
//!
//! Mutation is serialized by the owning registry's registration lock; the
//! maps here only need to tolerate concurrent dispatch-path reads.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::bus::{BusCallback, EventBus, OwnerId, PlatformKey, SubscriptionHandle};
use crate::listener::LogicalListener;

struct PlatformRegistration {
    handle: SubscriptionHandle,
    members: SmallVec<[u64; 4]>,
}

pub(crate) struct ListenerMultiplexer {
    bus: Arc<dyn EventBus>,
    owner: OwnerId,
    registrations: DashMap<PlatformKey, PlatformRegistration>,
    unmapped: Mutex<Vec<LogicalListener>>,
}

impl ListenerMultiplexer {
    pub(crate) fn new(bus: Arc<dyn EventBus>, owner: OwnerId) -> Self {
        Self {
            bus,
            owner,
            registrations: DashMap::new(),
            unmapped: Mutex::new(Vec::new()),
        }
    }

    /// Adds `listener` to its key's reference set, creating the single
    /// platform subscription on first use. `make_callback` is only invoked
    /// when the subscription is created.
    pub(crate) fn register(
        &self,
        listener: &LogicalListener,
        make_callback: impl FnOnce() -> BusCallback,
    ) {
        let subscription = &listener.subscription;
        let key = PlatformKey::new(
            subscription.event,
            subscription.phase,
            subscription.before_modifications,
        );
        let mut entry = self.registrations.entry(key).or_insert_with(|| {
            let handle = self.bus.subscribe(
                subscription.event,
                subscription.phase,
                subscription.before_modifications,
                self.owner.clone(),
                make_callback(),
            );
            debug!(event = subscription.event.name(), ?key.phase, "platform subscription created");
            PlatformRegistration {
                handle,
                members: SmallVec::new(),
            }
        });
        if !entry.members.contains(&listener.id) {
            entry.members.push(listener.id);
        }
    }

    /// Tracks a listener whose event type currently has no mapping. It gets
    /// no platform subscription; it becomes eligible for relay when a
    /// containing registry later supplies the mapping.
    pub(crate) fn register_unmapped(&self, listener: &LogicalListener) {
        debug!(
            event = listener.subscription.event.name(),
            owner = %listener.owner,
            "listener has no reachable mapping; deferred"
        );
        self.unmapped.lock().unwrap().push(listener.clone());
    }

    /// Removes `listener` from its key's reference set, tearing down the
    /// platform subscription when the set becomes empty. Unknown listeners
    /// are ignored.
    pub(crate) fn unregister(&self, listener: &LogicalListener) {
        self.unmapped
            .lock()
            .unwrap()
            .retain(|l| l.id != listener.id);

        let subscription = &listener.subscription;
        let key = PlatformKey::new(
            subscription.event,
            subscription.phase,
            subscription.before_modifications,
        );
        if let Some(mut entry) = self.registrations.get_mut(&key) {
            entry.members.retain(|id| *id != listener.id);
        }
        if let Some((_, registration)) =
            self.registrations.remove_if(&key, |_, r| r.members.is_empty())
        {
            self.bus.unsubscribe(registration.handle);
            debug!(event = subscription.event.name(), "platform subscription torn down");
        }
    }

    /// Snapshot of the currently unmapped listeners.
    pub(crate) fn unmapped_listeners(&self) -> Vec<LogicalListener> {
        self.unmapped.lock().unwrap().clone()
    }
}
