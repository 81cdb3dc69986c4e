//! Listener sets, typed handlers and the logical registrations fed to the
//! multiplexer.
//!
//! A [`ListenerSet`] is what a listener factory produces once a scope goes
//! live: a collection of typed handlers, each bound to an event type, a
//! phase and a before-modifications flag. The engine erases the handler
//! types immediately; from then on it only routes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::bus::OwnerId;
use crate::event::{Event, EventPhase};
use crate::hierarchy::TypeNode;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// One typed handler registration: event type, phase, before-modifications
/// flag and the erased handler.
#[derive(Clone)]
pub(crate) struct EventSubscription {
    pub(crate) event: TypeNode,
    pub(crate) phase: EventPhase,
    pub(crate) before_modifications: bool,
    pub(crate) handler: Arc<dyn Fn(&dyn Event) + Send + Sync>,
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("event", &self.event.name())
            .field("phase", &self.phase)
            .field("before_modifications", &self.before_modifications)
            .finish()
    }
}

/// A realized listener registration with a process-unique identity, used for
/// reference counting in the multiplexer.
#[derive(Clone)]
pub(crate) struct LogicalListener {
    pub(crate) id: u64,
    pub(crate) owner: OwnerId,
    pub(crate) subscription: EventSubscription,
}

/// The listener instance a factory produces for one scope.
///
/// Handlers are registered fluently; the closure receives the concrete event
/// after an internal downcast, so a handler registered for an ancestor event
/// type also fires for subtype instances routed through its bucket.
pub struct ListenerSet {
    owner: OwnerId,
    entries: Vec<EventSubscription>,
}

impl ListenerSet {
    /// Creates an empty set tied to `owner` (typically the plugin name).
    pub fn new(owner: impl Into<OwnerId>) -> Self {
        Self {
            owner: owner.into(),
            entries: Vec::new(),
        }
    }

    /// Registers a handler for `E` at the default phase, after
    /// modifications.
    pub fn on<E: Event>(self, handler: impl Fn(&E) + Send + Sync + 'static) -> Self {
        self.on_phase(EventPhase::Default, false, handler)
    }

    /// Registers a handler for `E` at an explicit phase and
    /// before-modifications flag.
    pub fn on_phase<E: Event>(
        mut self,
        phase: EventPhase,
        before_modifications: bool,
        handler: impl Fn(&E) + Send + Sync + 'static,
    ) -> Self {
        let erased = Arc::new(move |event: &dyn Event| {
            if let Some(event) = event.as_any().downcast_ref::<E>() {
                handler(event);
            }
        });
        self.entries.push(EventSubscription {
            event: E::event_node(),
            phase,
            before_modifications,
            handler: erased,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_listeners(self) -> Vec<LogicalListener> {
        let owner = self.owner;
        self.entries
            .into_iter()
            .map(|subscription| LogicalListener {
                id: NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed),
                owner: owner.clone(),
                subscription,
            })
            .collect()
    }
}

/// Build-time listener template: instantiated for every scope whose declared
/// type matches `scope_type` (or a descendant of it).
pub(crate) struct ListenerTemplate<S> {
    pub(crate) scope_type: TypeNode,
    pub(crate) factory: Arc<dyn Fn(&S) -> ListenerSet + Send + Sync>,
}
