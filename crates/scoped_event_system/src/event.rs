//! The event trait and the platform phase domain.

use std::any::Any;
use std::fmt::Debug;

use crate::hierarchy::TypeNode;

/// Trait that all routable events must implement.
///
/// The engine never inspects an event beyond its declared [`TypeNode`]; the
/// node drives mapping resolution and the `Any` view lets typed handlers
/// downcast back to the concrete type. Use [`impl_event!`](crate::impl_event)
/// to generate the impl together with the hierarchy declaration.
pub trait Event: Any + Send + Sync + Debug {
    /// The node for this event type.
    fn event_node() -> TypeNode
    where
        Self: Sized;

    /// The node of this instance's runtime type.
    fn node(&self) -> TypeNode;

    /// Type-erased view for downcasting in typed handlers.
    fn as_any(&self) -> &dyn Any;
}

/// The platform bus's totally ordered listener phases.
///
/// The engine does not interpret phase semantics; the phase is part of the
/// multiplexing key and relative registration order is preserved within a
/// phase/before-modifications bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventPhase {
    First,
    Early,
    Default,
    Late,
    Last,
}

impl EventPhase {
    /// All phases, in firing order.
    pub const ALL: [EventPhase; 5] = [
        EventPhase::First,
        EventPhase::Early,
        EventPhase::Default,
        EventPhase::Late,
        EventPhase::Last,
    ];

    /// Number of phases.
    pub const COUNT: usize = Self::ALL.len();

    /// Position of this phase in the firing order.
    pub const fn ordinal(self) -> usize {
        self as usize
    }
}

impl Default for EventPhase {
    fn default() -> Self {
        EventPhase::Default
    }
}

/// Dispatch buckets: one per (phase, before-modifications) combination.
pub(crate) const BUCKET_COUNT: usize = EventPhase::COUNT * 2;

/// Index of the dispatch bucket for a (phase, before-modifications) pair.
pub(crate) const fn bucket_index(phase: EventPhase, before_modifications: bool) -> usize {
    phase.ordinal() + if before_modifications { EventPhase::COUNT } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordinals_follow_firing_order() {
        for window in EventPhase::ALL.windows(2) {
            assert!(window[0] < window[1]);
            assert!(window[0].ordinal() < window[1].ordinal());
        }
    }

    #[test]
    fn test_bucket_indices_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for phase in EventPhase::ALL {
            for before in [false, true] {
                assert!(seen.insert(bucket_index(phase, before)));
            }
        }
        assert_eq!(seen.len(), BUCKET_COUNT);
    }
}
