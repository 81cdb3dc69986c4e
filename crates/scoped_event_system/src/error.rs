//! Error types for scope registration.
//!
//! Only registration can fail. Delivery-time non-matches (no mapping, scope
//! not live, no child unit) are normal steady-state outcomes and are neither
//! reported nor logged.

/// Configuration errors raised synchronously from scope registration.
///
/// All variants leave the registry untouched: registration is
/// validate-then-commit and fails with no side effects.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// A listener's event type has no reachable mapping in this registry or
    /// any ancestor parent-mapping default.
    #[error("no mapping reachable for event type {event_type}")]
    UnmappedEvent { event_type: &'static str },

    /// A child registry derives a forward for an event type that the
    /// containing registry cannot map; the forward would be unreachable.
    #[error("child registry forwards event type {event_type} which has no mapping in the containing registry")]
    UnmappedForward { event_type: &'static str },

    /// The scope is already live; re-registration without an intervening
    /// unregister is rejected.
    #[error("scope already registered: {scope}")]
    ScopeAlreadyRegistered { scope: String },
}
