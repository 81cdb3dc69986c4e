//! Declarative macros that generate hierarchy and event declarations.
//!
//! Routing is driven by explicitly declared type hierarchies (see
//! [`crate::hierarchy`]). These macros keep those declarations to one line
//! per type:
//!
//! ```rust
//! use scoped_event_system::{impl_event, impl_hierarchy_node};
//!
//! struct Cancellable;
//! impl_hierarchy_node!(Cancellable);
//!
//! #[derive(Debug)]
//! struct PlayerEvent;
//! impl_event!(PlayerEvent);
//!
//! #[derive(Debug)]
//! struct PlayerMoveEvent;
//! impl_event!(PlayerMoveEvent: PlayerEvent, [Cancellable]);
//! ```

/// Implements [`HierarchyNode`](crate::hierarchy::HierarchyNode) for a type.
///
/// Forms:
/// - `impl_hierarchy_node!(Type)` declares a root with no ancestors.
/// - `impl_hierarchy_node!(Type: Super)` adds a supertype edge.
/// - `impl_hierarchy_node!(Type: [CapA, CapB])` adds capability edges only.
/// - `impl_hierarchy_node!(Type: Super, [CapA, CapB])` adds both.
#[macro_export]
macro_rules! impl_hierarchy_node {
    ($ty:ty) => {
        $crate::__impl_hierarchy_node_inner!($ty, ::core::option::Option::None, []);
    };
    ($ty:ty : [$($cap:ty),+ $(,)?]) => {
        $crate::__impl_hierarchy_node_inner!($ty, ::core::option::Option::None, [$($cap),+]);
    };
    ($ty:ty : $super:ty, [$($cap:ty),+ $(,)?]) => {
        $crate::__impl_hierarchy_node_inner!(
            $ty,
            ::core::option::Option::Some(
                <$super as $crate::hierarchy::HierarchyNode>::node
                    as fn() -> $crate::hierarchy::TypeNode
            ),
            [$($cap),+]
        );
    };
    ($ty:ty : $super:ty) => {
        $crate::__impl_hierarchy_node_inner!(
            $ty,
            ::core::option::Option::Some(
                <$super as $crate::hierarchy::HierarchyNode>::node
                    as fn() -> $crate::hierarchy::TypeNode
            ),
            []
        );
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __impl_hierarchy_node_inner {
    ($ty:ty, $super:expr, [$($cap:ty),*]) => {
        impl $crate::hierarchy::HierarchyNode for $ty {
            fn node() -> $crate::hierarchy::TypeNode {
                const CAPABILITIES: &[fn() -> $crate::hierarchy::TypeNode] =
                    &[$(<$cap as $crate::hierarchy::HierarchyNode>::node),*];
                $crate::hierarchy::TypeNode::new(
                    ::std::any::TypeId::of::<$ty>(),
                    ::std::any::type_name::<$ty>(),
                    $super,
                    CAPABILITIES,
                )
            }
        }
    };
}

/// Implements both [`HierarchyNode`](crate::hierarchy::HierarchyNode) and
/// [`Event`](crate::event::Event) for an event type.
///
/// Takes the same forms as [`impl_hierarchy_node!`]. The type must be
/// `Debug + Send + Sync + 'static`.
#[macro_export]
macro_rules! impl_event {
    ($ty:ty) => {
        $crate::impl_hierarchy_node!($ty);
        $crate::__impl_event_trait!($ty);
    };
    ($ty:ty : $($rest:tt)+) => {
        $crate::impl_hierarchy_node!($ty : $($rest)+);
        $crate::__impl_event_trait!($ty);
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __impl_event_trait {
    ($ty:ty) => {
        impl $crate::event::Event for $ty {
            fn event_node() -> $crate::hierarchy::TypeNode {
                <$ty as $crate::hierarchy::HierarchyNode>::node()
            }

            fn node(&self) -> $crate::hierarchy::TypeNode {
                <$ty as $crate::hierarchy::HierarchyNode>::node()
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    };
}
