//! Explicit type hierarchy declarations and the priority-ordered walk used
//! by every mapping lookup in the engine.
//!
//! Rust has no runtime class hierarchy, so types that participate in routing
//! declare their ancestry explicitly: an optional supertype edge plus a set
//! of capability (interface-like) edges. The [`impl_hierarchy_node!`] and
//! [`impl_event!`](crate::impl_event) macros generate these declarations.

use std::any::TypeId;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

use smallvec::SmallVec;

/// A lightweight, copyable descriptor of one type in a declared hierarchy.
///
/// Edges are `fn() -> TypeNode` thunks rather than `TypeNode` values so that
/// nodes can reference each other without static-initialization ordering
/// concerns. Identity is the underlying [`TypeId`]; the name is carried for
/// diagnostics only.
#[derive(Clone, Copy)]
pub struct TypeNode {
    id: TypeId,
    name: &'static str,
    supertype: Option<fn() -> TypeNode>,
    capabilities: &'static [fn() -> TypeNode],
}

impl TypeNode {
    /// Creates a node. Normally generated by [`impl_hierarchy_node!`].
    pub fn new(
        id: TypeId,
        name: &'static str,
        supertype: Option<fn() -> TypeNode>,
        capabilities: &'static [fn() -> TypeNode],
    ) -> Self {
        Self {
            id,
            name,
            supertype,
            capabilities,
        }
    }

    /// The `TypeId` this node describes.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The type name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeNode {}

impl std::hash::Hash for TypeNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeNode").field(&self.name).finish()
    }
}

/// Types that carry a declared position in a routing hierarchy.
///
/// Implemented by event types, scope types and capability markers. Use
/// [`impl_hierarchy_node!`] rather than writing the impl by hand.
pub trait HierarchyNode: 'static {
    /// The node describing this type.
    fn node() -> TypeNode;
}

struct WalkEntry {
    cost: u32,
    seq: u32,
    node: TypeNode,
}

// BinaryHeap is a max-heap; invert the ordering to pop the cheapest entry,
// with the insertion sequence as a deterministic tie-break.
impl Ord for WalkEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for WalkEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for WalkEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.seq == other.seq
    }
}

impl Eq for WalkEntry {}

/// Walks `root` and its ancestors, nearest first.
///
/// Following a supertype edge costs +1 and a capability edge +2, so anything
/// at accumulated distance `d` is visited strictly before anything at
/// distance `d + 1` and supertype chains win over capability sets at the
/// same nominal depth. `visit` short-circuits the walk by returning `Some`.
///
/// Diamond-inherited capabilities may be visited more than once; callers
/// must treat `visit` as idempotent or dedupe results themselves.
pub fn walk_hierarchy<R>(
    root: TypeNode,
    mut visit: impl FnMut(TypeNode) -> Option<R>,
) -> Option<R> {
    let mut queue: BinaryHeap<WalkEntry> = BinaryHeap::new();
    let mut seq = 0u32;
    queue.push(WalkEntry {
        cost: 0,
        seq,
        node: root,
    });

    while let Some(entry) = queue.pop() {
        if let Some(found) = visit(entry.node) {
            return Some(found);
        }

        if let Some(supertype) = entry.node.supertype {
            seq += 1;
            queue.push(WalkEntry {
                cost: entry.cost + 1,
                seq,
                node: supertype(),
            });
        }
        for capability in entry.node.capabilities {
            seq += 1;
            queue.push(WalkEntry {
                cost: entry.cost + 2,
                seq,
                node: capability(),
            });
        }
    }

    None
}

/// Deduplicated `TypeId`s of `root` and all its ancestors, in walk order.
pub(crate) fn hierarchy_ids(root: TypeNode) -> SmallVec<[TypeId; 8]> {
    let mut ids: SmallVec<[TypeId; 8]> = SmallVec::new();
    let _ = walk_hierarchy::<()>(root, |node| {
        if !ids.contains(&node.id()) {
            ids.push(node.id());
        }
        None
    });
    ids
}
