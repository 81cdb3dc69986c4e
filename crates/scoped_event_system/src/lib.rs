//! # Scoped Event System
//!
//! A scope-aware event routing engine: independent plugin components
//! register interest in named scopes (one per game world, session, match,
//! ...) and receive only the events relevant to their scope, while all
//! scopes share one underlying platform event bus.
//!
//! ## Core Features
//!
//! - **Type-Hierarchy Routing**: Events resolve to scopes through an
//!   explicitly declared type hierarchy with deterministic nearest-first
//!   precedence
//! - **Subscription Multiplexing**: Many scope-local listener sets share a
//!   minimal number of platform-level registrations, with reference-counted
//!   teardown
//! - **Hierarchical Scopes**: A child scope can be derived from a parent
//!   scope plus the event itself, recursively, with per-unit memoized
//!   derivation lookup
//! - **Validate-Then-Commit**: Registration checks that every listener's
//!   event type has a reachable mapping before any global state is mutated
//! - **Synchronous Dispatch**: The platform's calling thread executes the
//!   whole downstream fan-out; no queueing, no backpressure
//!
//! ## Quick Start Example
//!
//! ```rust
//! use scoped_event_system::*;
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct PlayerMoveEvent {
//!     world: &'static str,
//! }
//! impl_event!(PlayerMoveEvent);
//!
//! #[derive(Debug, Clone, PartialEq, Eq, Hash)]
//! struct World(&'static str);
//! impl_hierarchy_node!(World);
//!
//! let bus = Arc::new(MemoryEventBus::new());
//! let registry = ScopeRegistry::<World>::builder(bus.clone(), "my_plugin")
//!     .mapping::<PlayerMoveEvent>(|event| Some(World(event.world)))
//!     .listener(|world: &World| {
//!         let world = world.clone();
//!         ListenerSet::new("my_plugin").on::<PlayerMoveEvent>(move |event| {
//!             println!("move in {:?}: {:?}", world, event);
//!         })
//!     })
//!     .build();
//!
//! registry.register_scope(World("overworld")).unwrap();
//!
//! // Published events reach only the owning scope's listeners.
//! bus.publish(&PlayerMoveEvent { world: "overworld" });
//! bus.publish(&PlayerMoveEvent { world: "nether" }); // silently dropped
//!
//! registry.unregister_scope(&World("overworld"));
//! ```
//!
//! ## Architecture Overview
//!
//! - [`hierarchy`]: explicit type hierarchy declarations and the
//!   priority-ordered walk behind every lookup
//! - [`bus`]: the abstract host platform bus boundary and the in-memory
//!   implementation
//! - [`listener`]: listener sets, typed handlers and logical registrations
//! - [`registry`]: the routing engine, per-scope dispatch units and the
//!   builder
//!
//! Scope registration is atomic: with validation enabled it either reaches
//! the live state completely or fails with a [`RegistrationError`] and no
//! side effects. Delivery-time non-matches (no mapping, scope not live, no
//! child unit) are normal outcomes and are silently dropped.

pub mod bus;
pub mod error;
pub mod event;
pub mod hierarchy;
pub mod listener;
pub mod macros;
mod mapping;
mod multiplexer;
pub mod registry;

pub use bus::{
    BusCallback, EventBus, MemoryEventBus, OwnerId, PlatformKey, SubscriptionHandle,
};
pub use error::RegistrationError;
pub use event::{Event, EventPhase};
pub use hierarchy::{walk_hierarchy, HierarchyNode, TypeNode};
pub use listener::ListenerSet;
pub use registry::{ScopeKey, ScopeOptions, ScopeRegistry, ScopeRegistryBuilder};

/// Result type used throughout the system.
pub type Result<T> = std::result::Result<T, RegistrationError>;
