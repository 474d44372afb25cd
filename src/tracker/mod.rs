//! TRACKER subsystem: process-wide event subscriptions.
//!
//! Listeners register interest in engine activity (dispatch/reply of work,
//! entry/exit of tagged regions) and the registry hands every matching event
//! back to them, consuming one-shot subscriptions atomically.

/// Condition and scope matching.
pub mod matcher;
/// Subscription table and event dispatch.
pub mod registry;
/// Subscription and event type definitions.
pub mod triggers;

pub use matcher::{condition_matches, scope_matches};
pub use registry::{Delivery, DispatchReport, ReactionSink, TrackerRegistry};
pub use triggers::{
    Condition, Event, EventKind, Flavour, Pattern, Scope, Subscription, SubscriptionId,
    TrackerAction, PARTICIPANT_NAME, TAG,
};
