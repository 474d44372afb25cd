//! LISTEN construct: a workflow step that reacts to activity elsewhere in the engine.
//!
//! A listener subscribes to dispatches/replies of a named worker or to
//! entry/exit of a named tag, optionally restricted to its own process
//! instance, and either resumes its branch (blocking) or forks a new branch per
//! match (triggering).

/// Raw and resolved listener configuration.
pub mod attributes;
/// Listener state machine.
pub mod expression;

pub use attributes::{AttributeValue, ListenAttributes, ListenSpec, Upon};
pub use expression::{
    Completion, ListenContext, ListenExpression, ListenPhase, ListenRecord, MatchOutcome,
};
