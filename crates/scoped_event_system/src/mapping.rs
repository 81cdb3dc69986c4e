//! The mapping table: event-to-scope resolvers plus parent-mapping data for
//! child-scope derivation.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::event::Event;
use crate::hierarchy::{walk_hierarchy, TypeNode};

/// Resolves the scope owning an event, or `None` when the event belongs to
/// no scope of this registry.
pub(crate) type EventMapper<S> = Arc<dyn Fn(&dyn Event) -> Option<S> + Send + Sync>;

/// Default child derivation: parent scope (erased) to child scope.
pub(crate) type ParentScopeMapper<S> = Arc<dyn Fn(&dyn Any) -> Option<S> + Send + Sync>;

/// Per-event-type child derivation: (parent scope, event) to child scope.
pub(crate) type ParentEventMapper<S> =
    Arc<dyn Fn(&dyn Any, &dyn Event) -> Option<S> + Send + Sync>;

struct MappingEntry<S> {
    node: TypeNode,
    mapper: EventMapper<S>,
}

struct ParentEventEntry<S> {
    node: TypeNode,
    mapper: ParentEventMapper<S>,
}

/// Child-derivation data declared against one ancestor scope type.
struct ParentMappingData<S> {
    mappings: HashMap<TypeId, ParentEventEntry<S>>,
    default_mapping: Option<ParentScopeMapper<S>>,
}

impl<S> ParentMappingData<S> {
    fn new() -> Self {
        Self {
            mappings: HashMap::new(),
            default_mapping: None,
        }
    }
}

/// One event type's derived child mapping, produced by
/// [`MappingTable::compute_child_mappings`].
pub(crate) struct ChildDerivation<S> {
    pub(crate) node: TypeNode,
    pub(crate) mapper: ParentEventMapper<S>,
}

/// Registry of event-to-scope resolvers and parent-mapping derivation
/// functions. Immutable once the owning registry is built.
pub(crate) struct MappingTable<S> {
    mappings: HashMap<TypeId, MappingEntry<S>>,
    parent_mappings: HashMap<TypeId, ParentMappingData<S>>,
}

impl<S: Clone + 'static> MappingTable<S> {
    pub(crate) fn new() -> Self {
        Self {
            mappings: HashMap::new(),
            parent_mappings: HashMap::new(),
        }
    }

    /// Adds an event mapper. First registration wins; later mappers for the
    /// same event type are ignored.
    pub(crate) fn add_mapping(&mut self, node: TypeNode, mapper: EventMapper<S>) {
        self.mappings
            .entry(node.id())
            .or_insert(MappingEntry { node, mapper });
    }

    /// Adds a default child-derivation function for an ancestor scope type.
    /// Last registration wins.
    pub(crate) fn add_parent_default(&mut self, parent: TypeNode, mapper: ParentScopeMapper<S>) {
        self.parent_mappings
            .entry(parent.id())
            .or_insert_with(ParentMappingData::new)
            .default_mapping = Some(mapper);
    }

    /// Adds a per-event-type child-derivation function for an ancestor scope
    /// type. First registration per event type wins.
    pub(crate) fn add_parent_event_mapping(
        &mut self,
        parent: TypeNode,
        event: TypeNode,
        mapper: ParentEventMapper<S>,
    ) {
        self.parent_mappings
            .entry(parent.id())
            .or_insert_with(ParentMappingData::new)
            .mappings
            .entry(event.id())
            .or_insert(ParentEventEntry {
                node: event,
                mapper,
            });
    }

    /// Finds the mapper for an event type: exact lookup first, then the
    /// hierarchy walk. Resolution stops at the first ancestor that *has* a
    /// mapper; a mapper returning `None` at dispatch time means "no scope",
    /// it does not fall through to higher ancestors.
    pub(crate) fn find_mapping(&self, node: TypeNode) -> Option<EventMapper<S>> {
        if let Some(entry) = self.mappings.get(&node.id()) {
            return Some(entry.mapper.clone());
        }
        walk_hierarchy(node, |n| self.mappings.get(&n.id()).map(|e| e.mapper.clone()))
    }

    /// Whether any mapping is reachable for this event type, counting
    /// parent-mapping entries: a per-event-type derivation for any visited
    /// ancestor, or any non-null default derivation, makes the event
    /// routable once this registry gains a container.
    pub(crate) fn contains_mapping(&self, node: TypeNode) -> bool {
        if self.find_mapping(node).is_some() {
            return true;
        }
        walk_hierarchy(node, |n| {
            for data in self.parent_mappings.values() {
                if data.default_mapping.is_some() {
                    return Some(());
                }
                if data.mappings.contains_key(&n.id()) {
                    return Some(());
                }
            }
            None
        })
        .is_some()
    }

    /// Nodes of every event type with a registered mapper.
    pub(crate) fn known_event_nodes(&self) -> Vec<TypeNode> {
        self.mappings.values().map(|entry| entry.node).collect()
    }

    /// Computes the derived child mappings for a scope of type
    /// `parent_scope` being registered in a containing registry.
    ///
    /// Walks the parent scope's hierarchy collecting per-event-type
    /// derivations (first occurrence per event type wins, nearest ancestor
    /// first). If any visited ancestor carries a default derivation, a
    /// `(scope, _) -> default(scope)` forward is synthesized for every event
    /// type in `parent_events` that has no more specific derivation.
    pub(crate) fn compute_child_mappings(
        &self,
        parent_scope: TypeNode,
        parent_events: &[TypeNode],
    ) -> HashMap<TypeId, ChildDerivation<S>> {
        let mut derived: HashMap<TypeId, ChildDerivation<S>> = HashMap::new();
        let mut default_mapping: Option<ParentScopeMapper<S>> = None;

        let _ = walk_hierarchy::<()>(parent_scope, |n| {
            if let Some(data) = self.parent_mappings.get(&n.id()) {
                for (event_id, entry) in &data.mappings {
                    derived.entry(*event_id).or_insert_with(|| ChildDerivation {
                        node: entry.node,
                        mapper: entry.mapper.clone(),
                    });
                }
                if default_mapping.is_none() {
                    default_mapping = data.default_mapping.clone();
                }
            }
            None
        });

        if let Some(default_mapping) = default_mapping {
            for event in parent_events {
                let default_mapping = default_mapping.clone();
                derived.entry(event.id()).or_insert_with(|| ChildDerivation {
                    node: *event,
                    mapper: Arc::new(move |scope, _event| default_mapping(scope)),
                });
            }
        }

        derived
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyNode;
    use crate::{impl_event, impl_hierarchy_node};

    #[derive(Debug)]
    struct EventA;
    #[derive(Debug)]
    struct EventB;
    #[derive(Debug)]
    struct EventE;
    #[derive(Debug)]
    struct UnrelatedEvent;

    impl_event!(EventA);
    impl_event!(EventB: EventA);
    impl_event!(EventE: EventB);
    impl_event!(UnrelatedEvent);

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct World(&'static str);
    impl_hierarchy_node!(World);

    fn constant_mapper(world: &'static str) -> EventMapper<World> {
        Arc::new(move |_| Some(World(world)))
    }

    #[test]
    fn test_first_mapper_wins() {
        let mut table: MappingTable<World> = MappingTable::new();
        table.add_mapping(EventA::event_node(), constant_mapper("first"));
        table.add_mapping(EventA::event_node(), constant_mapper("second"));

        let mapper = table.find_mapping(EventA::event_node()).unwrap();
        assert_eq!(mapper(&EventA), Some(World("first")));
    }

    #[test]
    fn test_hierarchy_precedence_prefers_nearest_ancestor() {
        let mut table: MappingTable<World> = MappingTable::new();
        table.add_mapping(EventA::event_node(), constant_mapper("a"));
        table.add_mapping(EventB::event_node(), constant_mapper("b"));

        let mapper = table.find_mapping(EventE::event_node()).unwrap();
        assert_eq!(mapper(&EventE), Some(World("b")));
    }

    #[test]
    fn test_resolution_stops_at_first_registered_ancestor() {
        let mut table: MappingTable<World> = MappingTable::new();
        table.add_mapping(EventB::event_node(), Arc::new(|_| None));
        table.add_mapping(EventA::event_node(), constant_mapper("a"));

        // EventB's mapper declines; resolution must not fall through to
        // EventA's mapper.
        let mapper = table.find_mapping(EventE::event_node()).unwrap();
        assert_eq!(mapper(&EventE), None);
    }

    #[test]
    fn test_contains_mapping_counts_parent_default() {
        let mut table: MappingTable<World> = MappingTable::new();
        assert!(!table.contains_mapping(EventE::event_node()));

        table.add_parent_default(World::node(), Arc::new(|_| Some(World("derived"))));
        assert!(table.contains_mapping(EventE::event_node()));
        assert!(table.contains_mapping(UnrelatedEvent::event_node()));
    }

    #[test]
    fn test_contains_mapping_counts_parent_event_mapping() {
        let mut table: MappingTable<World> = MappingTable::new();
        table.add_parent_event_mapping(
            World::node(),
            EventB::event_node(),
            Arc::new(|_, _| Some(World("derived"))),
        );

        assert!(table.contains_mapping(EventE::event_node()));
        assert!(!table.contains_mapping(UnrelatedEvent::event_node()));
    }

    #[test]
    fn test_compute_child_mappings_synthesizes_defaults() {
        // The child table declares derivations against the parent scope
        // type; the parent's known event types seed the default synthesis.
        let mut child: MappingTable<World> = MappingTable::new();
        child.add_parent_default(World::node(), Arc::new(|_| Some(World("default"))));
        child.add_parent_event_mapping(
            World::node(),
            EventB::event_node(),
            Arc::new(|_, _| Some(World("specific"))),
        );

        let parent_events = [EventA::event_node(), EventB::event_node()];
        let derived = child.compute_child_mappings(World::node(), &parent_events);

        assert_eq!(derived.len(), 2);
        let specific = &derived[&EventB::event_node().id()];
        assert_eq!(
            (specific.mapper)(&World("w"), &EventB),
            Some(World("specific"))
        );
        let synthesized = &derived[&EventA::event_node().id()];
        assert_eq!(
            (synthesized.mapper)(&World("w"), &EventA),
            Some(World("default"))
        );
    }

    #[test]
    fn test_compute_child_mappings_without_default_collects_only_specific() {
        let mut child: MappingTable<World> = MappingTable::new();
        child.add_parent_event_mapping(
            World::node(),
            EventB::event_node(),
            Arc::new(|_, _| Some(World("specific"))),
        );

        let parent_events = [EventA::event_node(), EventB::event_node()];
        let derived = child.compute_child_mappings(World::node(), &parent_events);
        assert_eq!(derived.len(), 1);
        assert!(derived.contains_key(&EventB::event_node().id()));
    }

    #[test]
    fn test_parent_default_last_write_wins() {
        let mut child: MappingTable<World> = MappingTable::new();
        child.add_parent_default(World::node(), Arc::new(|_| Some(World("old"))));
        child.add_parent_default(World::node(), Arc::new(|_| Some(World("new"))));

        let parent_events = [EventA::event_node()];
        let derived = child.compute_child_mappings(World::node(), &parent_events);
        let mapping = &derived[&EventA::event_node().id()];
        assert_eq!((mapping.mapper)(&World("w"), &EventA), Some(World("new")));
    }
}
