//! The routing engine: scope registration, event-to-scope resolution and
//! per-scope dispatch, including hierarchical (parent/child) scope
//! forwarding.
//!
//! Registration follows a validate-then-commit protocol: the full realized
//! listener set and the full derived child-mapping set are computed before
//! the multiplexer or the live-scope table is touched, so a failed
//! registration leaves no trace. Dispatch reads take snapshots from the
//! concurrent tables rather than holding any lock across listener
//! invocation.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::bus::{EventBus, OwnerId};
use crate::error::RegistrationError;
use crate::event::{bucket_index, Event, EventPhase, BUCKET_COUNT};
use crate::hierarchy::{hierarchy_ids, walk_hierarchy, HierarchyNode, TypeNode};
use crate::listener::{ListenerSet, ListenerTemplate, LogicalListener};
use crate::mapping::{
    EventMapper, MappingTable, ParentEventMapper, ParentScopeMapper,
};
use crate::multiplexer::ListenerMultiplexer;
use crate::Result;

/// Requirements on a scope value: an opaque, identity-comparable map key
/// with a declared hierarchy position. The engine never inspects a scope
/// beyond this.
pub trait ScopeKey:
    HierarchyNode + Clone + Eq + Hash + Debug + Send + Sync + 'static
{
}

impl<T> ScopeKey for T where T: HierarchyNode + Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// Forwards an event into a child registry: derives the child scope from the
/// (erased) parent scope and redelivers into the child's dispatch unit.
pub(crate) type ChildForwarder =
    Arc<dyn Fn(&dyn Any, &dyn Event, EventPhase, bool) + Send + Sync>;

pub(crate) struct ErasedChildMapping {
    node: TypeNode,
    forward: ChildForwarder,
}

/// Object-safe view of a child registry held by a containing scope.
pub(crate) trait ChildRegistry: Send + Sync + 'static {
    /// Derived child mappings for a containing scope of type
    /// `parent_scope`, with defaults synthesized over `parent_events`.
    fn derive_child_mappings(
        &self,
        parent_scope: TypeNode,
        parent_events: &[TypeNode],
    ) -> HashMap<TypeId, ErasedChildMapping>;

    /// Listeners of this registry that currently have no reachable mapping.
    fn unmapped_listeners(&self) -> Vec<LogicalListener>;
}

struct ChildLink {
    /// Keeps the child registry's state alive while this scope links to it.
    #[allow(dead_code)]
    registry: Arc<dyn ChildRegistry>,
    mappings: HashMap<TypeId, ErasedChildMapping>,
    /// The child listeners absorbed at registration time. Snapshotted so the
    /// containing scope can release them even after the child scope itself
    /// has been unregistered.
    absorbed: Vec<LogicalListener>,
    /// Memoized event-runtime-type to forwarder resolution. Populate-once,
    /// read-many; recomputing the same pure derivation concurrently is
    /// harmless.
    cache: DashMap<TypeId, Option<ChildForwarder>>,
}

/// Per-scope dispatch state: listener buckets grouped by
/// (phase, before-modifications) and the optional child forwarding link.
pub(crate) struct ScopeDispatchUnit<S> {
    buckets: Vec<Vec<LogicalListener>>,
    child: Option<ChildLink>,
    _scope: std::marker::PhantomData<fn(&S)>,
}

impl<S: ScopeKey> ScopeDispatchUnit<S> {
    /// Fires this scope's listeners for the bucket, in registration order,
    /// then forwards into the child registry if a derivation applies.
    fn handle_event(
        &self,
        scope: &S,
        event: &dyn Event,
        phase: EventPhase,
        before_modifications: bool,
    ) {
        let bucket = &self.buckets[bucket_index(phase, before_modifications)];
        if !bucket.is_empty() {
            let event_ids = hierarchy_ids(event.node());
            for listener in bucket {
                if event_ids.contains(&listener.subscription.event.id()) {
                    (listener.subscription.handler)(event);
                }
            }
        }

        let Some(child) = &self.child else {
            return;
        };
        let forward = child
            .cache
            .entry(event.node().id())
            .or_insert_with(|| {
                walk_hierarchy(event.node(), |n| {
                    child.mappings.get(&n.id()).map(|m| m.forward.clone())
                })
            })
            .clone();
        if let Some(forward) = forward {
            forward(scope, event, phase, before_modifications);
        }
    }

    fn listeners(&self) -> impl Iterator<Item = &LogicalListener> {
        self.buckets.iter().flatten()
    }
}

struct RegistryInner<S: ScopeKey> {
    table: MappingTable<S>,
    templates: Vec<ListenerTemplate<S>>,
    multiplexer: ListenerMultiplexer,
    scopes: DashMap<S, Arc<ScopeDispatchUnit<S>>>,
    /// Serializes scope registration and unregistration so the
    /// validate-then-commit sequence appears atomic to other registrants.
    /// Dispatch never takes this lock.
    registration_lock: Mutex<()>,
}

/// The routing engine: maps incoming events to zero-or-one owning scope and
/// dispatches to that scope's listener set.
///
/// Cheaply cloneable handle; clones share the same state. Built via
/// [`ScopeRegistry::builder`].
pub struct ScopeRegistry<S: ScopeKey> {
    inner: Arc<RegistryInner<S>>,
}

impl<S: ScopeKey> Clone for ScopeRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Options for one scope registration.
pub struct ScopeOptions<S: ScopeKey> {
    listeners: Vec<Arc<dyn Fn(&S) -> ListenerSet + Send + Sync>>,
    child: Option<Arc<dyn ChildRegistry>>,
    validate: bool,
}

impl<S: ScopeKey> ScopeOptions<S> {
    /// Options with validation enabled: registration fails unless every
    /// listener's event type has a reachable mapping.
    pub fn validate() -> Self {
        Self {
            listeners: Vec::new(),
            child: None,
            validate: true,
        }
    }

    /// Options with validation skipped: unmapped listeners are tracked for
    /// later transitive activation instead of rejected.
    pub fn skip_validation() -> Self {
        Self {
            validate: false,
            ..Self::validate()
        }
    }

    /// Appends an additional listener factory for this registration only.
    pub fn with_listener(
        mut self,
        factory: impl Fn(&S) -> ListenerSet + Send + Sync + 'static,
    ) -> Self {
        self.listeners.push(Arc::new(factory));
        self
    }

    /// Declares a child registry processed after this scope's own listeners,
    /// using the derivations the child declared via parent mappings.
    pub fn with_child<C: ScopeKey>(mut self, child: &ScopeRegistry<C>) -> Self {
        self.child = Some(Arc::new(child.clone()));
        self
    }
}

impl<S: ScopeKey> Default for ScopeOptions<S> {
    fn default() -> Self {
        Self::validate()
    }
}

impl<S: ScopeKey> ScopeRegistry<S> {
    /// Starts building a registry bound to `bus`, with subscriptions owned
    /// by `owner`.
    pub fn builder(bus: Arc<dyn EventBus>, owner: impl Into<OwnerId>) -> ScopeRegistryBuilder<S> {
        ScopeRegistryBuilder {
            bus,
            owner: owner.into(),
            table: MappingTable::new(),
            templates: Vec::new(),
        }
    }

    /// Registers `scope` with default options (validation on).
    pub fn register_scope(&self, scope: S) -> Result<()> {
        self.register_scope_with(scope, ScopeOptions::validate())
    }

    /// Registers `scope`, realizing its listener set and committing it to
    /// the live-scope table.
    ///
    /// With validation on, every listener's event type (and every event type
    /// the child registry would forward) must have a reachable mapping;
    /// otherwise the registration fails with no side effects. A scope that
    /// is already live is rejected.
    pub fn register_scope_with(&self, scope: S, options: ScopeOptions<S>) -> Result<()> {
        let inner = &self.inner;
        let _guard = inner.registration_lock.lock().unwrap();

        if inner.scopes.contains_key(&scope) {
            return Err(RegistrationError::ScopeAlreadyRegistered {
                scope: format!("{scope:?}"),
            });
        }

        // Child mappings first; an unreachable forward is a configuration
        // error, not a runtime no-op.
        let child_link = match &options.child {
            Some(child) => {
                let known_events = inner.table.known_event_nodes();
                let mappings = child.derive_child_mappings(S::node(), &known_events);
                if options.validate {
                    for mapping in mappings.values() {
                        if inner.table.find_mapping(mapping.node).is_none() {
                            return Err(RegistrationError::UnmappedForward {
                                event_type: mapping.node.name(),
                            });
                        }
                    }
                }
                let absorbed = child.unmapped_listeners();
                Some((child.clone(), mappings, absorbed))
            }
            None => None,
        };

        // Realize the full listener set: explicit factories first, then the
        // build-time templates, preserving order within each group.
        let mut listeners: Vec<LogicalListener> = Vec::new();
        for factory in &options.listeners {
            listeners.extend(factory(&scope).into_listeners());
        }
        for template in &inner.templates {
            listeners.extend((template.factory)(&scope).into_listeners());
        }

        if options.validate {
            for listener in &listeners {
                if !inner.table.contains_mapping(listener.subscription.event) {
                    return Err(RegistrationError::UnmappedEvent {
                        event_type: listener.subscription.event.name(),
                    });
                }
            }
            if let Some((_, _, absorbed)) = &child_link {
                for listener in absorbed {
                    if !inner.table.contains_mapping(listener.subscription.event) {
                        return Err(RegistrationError::UnmappedEvent {
                            event_type: listener.subscription.event.name(),
                        });
                    }
                }
            }
        }

        // Commit. Listeners go to the multiplexer grouped by bucket; the
        // scope only becomes visible to dispatch once the unit is stored.
        let mut buckets: Vec<Vec<LogicalListener>> =
            (0..BUCKET_COUNT).map(|_| Vec::new()).collect();
        for listener in &listeners {
            self.attach(listener);
            buckets[bucket_index(
                listener.subscription.phase,
                listener.subscription.before_modifications,
            )]
            .push(listener.clone());
        }
        if let Some((_, _, absorbed)) = &child_link {
            // Absorb the child's unmapped listeners: they are mapped now
            // that this registry is their container.
            for listener in absorbed {
                self.attach(listener);
            }
        }

        let child = child_link.map(|(registry, mappings, absorbed)| ChildLink {
            registry,
            mappings,
            absorbed,
            cache: DashMap::new(),
        });
        inner.scopes.insert(
            scope.clone(),
            Arc::new(ScopeDispatchUnit {
                buckets,
                child,
                _scope: std::marker::PhantomData,
            }),
        );
        debug!(scope = ?scope, listeners = listeners.len(), "scope registered");
        Ok(())
    }

    /// Unregisters `scope`, releasing its listeners and any absorbed child
    /// listeners. A no-op for scopes that are not registered.
    pub fn unregister_scope(&self, scope: &S) {
        let inner = &self.inner;
        let _guard = inner.registration_lock.lock().unwrap();

        let Some((_, unit)) = inner.scopes.remove(scope) else {
            return;
        };
        for listener in unit.listeners() {
            inner.multiplexer.unregister(listener);
        }
        if let Some(child) = &unit.child {
            for listener in &child.absorbed {
                inner.multiplexer.unregister(listener);
            }
        }
        debug!(scope = ?scope, "scope unregistered");
    }

    /// Whether `scope` is currently live.
    pub fn contains_scope(&self, scope: &S) -> bool {
        self.inner.scopes.contains_key(scope)
    }

    /// Number of live scopes.
    pub fn scope_count(&self) -> usize {
        self.inner.scopes.len()
    }

    /// Hands a listener to the multiplexer, or tracks it as unmapped. The
    /// platform callback created on first use resolves the owning scope and
    /// dispatches into its unit; if the scope is not live the event is
    /// dropped.
    fn attach(&self, listener: &LogicalListener) {
        let Some(mapper) = self.inner.table.find_mapping(listener.subscription.event) else {
            self.inner.multiplexer.register_unmapped(listener);
            return;
        };

        let phase = listener.subscription.phase;
        let before_modifications = listener.subscription.before_modifications;
        let weak = Arc::downgrade(&self.inner);
        self.inner.multiplexer.register(listener, move || {
            Arc::new(move |event: &dyn Event| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let Some(scope) = mapper(event) else {
                    return;
                };
                let Some(unit) = inner.scopes.get(&scope).map(|e| e.value().clone()) else {
                    return;
                };
                unit.handle_event(&scope, event, phase, before_modifications);
            })
        });
    }
}

impl<S: ScopeKey> ChildRegistry for ScopeRegistry<S> {
    fn derive_child_mappings(
        &self,
        parent_scope: TypeNode,
        parent_events: &[TypeNode],
    ) -> HashMap<TypeId, ErasedChildMapping> {
        let derived = self
            .inner
            .table
            .compute_child_mappings(parent_scope, parent_events);
        derived
            .into_iter()
            .map(|(event_id, derivation)| {
                let weak = Arc::downgrade(&self.inner);
                let mapper = derivation.mapper;
                let forward: ChildForwarder = Arc::new(
                    move |parent_scope, event, phase, before_modifications| {
                        let Some(inner) = weak.upgrade() else {
                            return;
                        };
                        let Some(child_scope) = mapper(parent_scope, event) else {
                            return;
                        };
                        let Some(unit) =
                            inner.scopes.get(&child_scope).map(|e| e.value().clone())
                        else {
                            return;
                        };
                        unit.handle_event(&child_scope, event, phase, before_modifications);
                    },
                );
                (
                    event_id,
                    ErasedChildMapping {
                        node: derivation.node,
                        forward,
                    },
                )
            })
            .collect()
    }

    fn unmapped_listeners(&self) -> Vec<LogicalListener> {
        self.inner.multiplexer.unmapped_listeners()
    }
}

/// Accumulates event mappings, parent mappings and listener templates, then
/// produces an immutable [`ScopeRegistry`].
pub struct ScopeRegistryBuilder<S: ScopeKey> {
    bus: Arc<dyn EventBus>,
    owner: OwnerId,
    table: MappingTable<S>,
    templates: Vec<ListenerTemplate<S>>,
}

impl<S: ScopeKey> ScopeRegistryBuilder<S> {
    /// Adds an event mapper that finds the scope to route `E` to. First
    /// registration per event type wins; later ones are silently ignored.
    pub fn mapping<E: Event>(
        mut self,
        mapper: impl Fn(&E) -> Option<S> + Send + Sync + 'static,
    ) -> Self {
        let erased: EventMapper<S> = Arc::new(move |event: &dyn Event| {
            event.as_any().downcast_ref::<E>().and_then(&mapper)
        });
        self.table.add_mapping(E::event_node(), erased);
        self
    }

    /// Adds a default child-derivation function used when a scope of this
    /// registry is registered under a containing registry whose scope type
    /// is (or descends from) `P`. Last registration wins.
    pub fn parent_mapping<P: HierarchyNode>(
        mut self,
        mapper: impl Fn(&P) -> Option<S> + Send + Sync + 'static,
    ) -> Self {
        let erased: ParentScopeMapper<S> = Arc::new(move |scope: &dyn Any| {
            scope.downcast_ref::<P>().and_then(&mapper)
        });
        self.table.add_parent_default(P::node(), erased);
        self
    }

    /// Adds a per-event-type child-derivation function for containing scope
    /// type `P` and event type `E`. First registration per event type wins.
    pub fn parent_event_mapping<P: HierarchyNode, E: Event>(
        mut self,
        mapper: impl Fn(&P, &E) -> Option<S> + Send + Sync + 'static,
    ) -> Self {
        let erased: ParentEventMapper<S> =
            Arc::new(move |scope: &dyn Any, event: &dyn Event| {
                let scope = scope.downcast_ref::<P>()?;
                let event = event.as_any().downcast_ref::<E>()?;
                mapper(scope, event)
            });
        self.table
            .add_parent_event_mapping(P::node(), E::event_node(), erased);
        self
    }

    /// Adds a default listener template instantiated for every scope this
    /// registry registers.
    pub fn listener(self, factory: impl Fn(&S) -> ListenerSet + Send + Sync + 'static) -> Self {
        self.listener_for::<S>(factory)
    }

    /// Adds a listener template for scopes whose declared type is `Q` or a
    /// descendant of it.
    pub fn listener_for<Q: HierarchyNode>(
        mut self,
        factory: impl Fn(&S) -> ListenerSet + Send + Sync + 'static,
    ) -> Self {
        self.templates.push(ListenerTemplate {
            scope_type: Q::node(),
            factory: Arc::new(factory),
        });
        self
    }

    /// Produces the immutable registry.
    ///
    /// Template applicability is resolved here: the registry's scope type is
    /// fixed, so templates declared for types outside its hierarchy can
    /// never match and are discarded.
    pub fn build(self) -> ScopeRegistry<S> {
        let scope_ids = hierarchy_ids(S::node());
        let mut templates = self.templates;
        templates.retain(|template| {
            let applicable = scope_ids.contains(&template.scope_type.id());
            if !applicable {
                trace!(
                    scope_type = template.scope_type.name(),
                    "listener template can never match this registry's scope type; dropped"
                );
            }
            applicable
        });

        ScopeRegistry {
            inner: Arc::new(RegistryInner {
                table: self.table,
                templates,
                multiplexer: ListenerMultiplexer::new(self.bus, self.owner),
                scopes: DashMap::new(),
                registration_lock: Mutex::new(()),
            }),
        }
    }
}
