//! # KyroFlow - Event Correlation for Workflow Engines
//!
//! KyroFlow lets a running process instance park until something happens
//! elsewhere in the engine: work being dispatched to (or received from) a
//! participant, or a tagged region being entered or left. A parked *listener*
//! either resumes its parent once (blocking use) or forks a fresh branch on
//! every occurrence (triggering use).
//!
//! ## Core Concepts
//!
//! - **Tracker registry**: process-wide table of subscriptions; matches each
//!   event against them and consumes one-shot subscriptions atomically
//! - **Condition**: attribute name to exact-or-regex pattern, all must match
//! - **Listener**: the `Applying -> Waiting -> Done` state machine built from
//!   `to`/`on`, `upon`, `merge`, `wfid` and `where` attributes
//! - **Merge**: how an event's workitem combines with the listener's snapshot
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kyroflow::{Engine, EngineConfig, ExpressionId, ListenAttributes, ProcessId, Workitem};
//! use kyroflow::testing::{RecordingLauncher, RecordingParent};
//!
//! let engine = Engine::in_memory(
//!     EngineConfig::inline(),
//!     Arc::new(RecordingLauncher::new()),
//!     Arc::new(RecordingParent::new()),
//! )?;
//!
//! let wf = ProcessId::new("wf-1");
//! engine.listen(
//!     ExpressionId::new(wf.clone(), "0_1"),
//!     &ListenAttributes::new().to("bob"),
//!     Workitem::new(),
//!     0,
//! )?;
//!
//! engine.emit_dispatch(wf, "bob", Workitem::new().with_field("x", 1));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod expression;
pub mod merge;
pub mod resolver;
pub mod workitem;

// Event correlation
pub mod executor;
pub mod listen;
pub mod tracker;

// Hosting and persistence
pub mod engine;
pub mod storage;

pub mod testing;

pub use engine::{Engine, EngineConfig, EngineStats};
pub use error::{ExecutionError, FlowError, FlowResult, ValidationError};
pub use executor::{Launcher, ParentChannel};
pub use expression::{ExpressionId, ProcessId};
pub use listen::{
    AttributeValue, Completion, ListenAttributes, ListenExpression, ListenPhase, ListenRecord,
    ListenSpec, MatchOutcome, Upon,
};
pub use merge::{merge, MergePolicy};
pub use resolver::{AttributeResolver, FieldResolver};
pub use storage::{ExpressionStore, InMemoryExpressionStore, StorageError};
pub use tracker::{
    Condition, Delivery, DispatchReport, Event, EventKind, Flavour, Pattern, ReactionSink, Scope,
    Subscription, SubscriptionId, TrackerAction, TrackerRegistry,
};
pub use workitem::{Fields, Workitem};
