//! The listening construct.
//!
//! A [`ListenExpression`] moves through `Applying -> Waiting -> Done`:
//!
//! - **Applying**: configuration is resolved, the record persisted, the tracker
//!   registered.
//! - **Waiting**: parked; nothing runs until the registry delivers a match or
//!   the listener is cancelled.
//! - **Done**: matched (blocking use) or cancelled.
//!
//! A listener without child steps is *blocking*: it holds a one-shot
//! subscription and resumes its parent with the merged workitem on the first
//! accepted match. A listener with child steps is *triggering*: it holds a
//! repeatable subscription and forks a forgotten branch rooted at its first
//! child for every accepted match, staying in `Waiting` until cancelled.
//! Branches already forked are not cancelled along with the listener.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FlowError, FlowResult};
use crate::executor::{Launcher, ParentChannel};
use crate::expression::ExpressionId;
use crate::merge::merge;
use crate::resolver::AttributeResolver;
use crate::storage::ExpressionStore;
use crate::tracker::{Delivery, Flavour, SubscriptionId, TrackerAction, TrackerRegistry};
use crate::workitem::Workitem;

use super::attributes::{ListenAttributes, ListenSpec};

/// Collaborators shared by every listener of an engine.
#[allow(missing_docs)]
#[derive(Clone)]
pub struct ListenContext {
    pub tracker: Arc<TrackerRegistry>,
    pub store: Arc<dyn ExpressionStore>,
    pub resolver: Arc<dyn AttributeResolver>,
    pub launcher: Arc<dyn Launcher>,
    pub parent: Arc<dyn ParentChannel>,
}

/// Persisted listener state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenRecord {
    /// Position of the listener in its process tree.
    pub id: ExpressionId,
    /// Configuration resolved at activation.
    pub spec: ListenSpec,
    /// Workitem as it was at activation; never mutated afterwards.
    pub snapshot: Workitem,
    /// Number of nested child steps (non-zero means triggering).
    pub child_count: usize,
    /// When the listener was first applied.
    pub applied_at: DateTime<Utc>,
}

impl ListenRecord {
    /// Record stamped with the current time.
    #[must_use]
    pub fn new(id: ExpressionId, spec: ListenSpec, snapshot: Workitem, child_count: usize) -> Self {
        Self {
            id,
            spec,
            snapshot,
            child_count,
            applied_at: Utc::now(),
        }
    }

    /// True when the listener has child steps.
    #[must_use]
    pub const fn is_triggering(&self) -> bool {
        self.child_count > 0
    }

    /// One-shot for blocking listeners, repeatable for triggering ones.
    #[must_use]
    pub const fn flavour(&self) -> Flavour {
        if self.is_triggering() {
            Flavour::Repeatable
        } else {
            Flavour::OneShot
        }
    }
}

/// Lifecycle phase of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenPhase {
    /// Configuration resolved, tracker not yet registered.
    Applying,
    /// Parked until a match or a cancel.
    Waiting,
    /// Matched or cancelled; no tracker is held.
    Done,
}

/// How a listener reached `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Completion {
    /// Blocking listener resumed its parent.
    Matched,
    /// Cancelled while waiting.
    Cancelled,
}

/// Result of handling one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Blocking listener completed and replied to its parent.
    Resumed,
    /// Triggering listener forked a branch.
    Forked { child: ExpressionId },
    /// The `where` guard evaluated to false.
    GuardRejected,
    /// The `where` guard could not be evaluated; treated as false.
    GuardFailed,
    /// Listener was no longer waiting.
    Stale,
}

#[derive(Debug)]
struct State {
    phase: ListenPhase,
    completion: Option<Completion>,
    subscription: Option<SubscriptionId>,
}

/// A listening construct bound to one position of a process tree.
pub struct ListenExpression {
    ctx: ListenContext,
    record: ListenRecord,
    state: Mutex<State>,
    matches: AtomicU64,
}

impl fmt::Debug for ListenExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenExpression")
            .field("id", &self.record.id)
            .field("phase", &self.state.try_lock().map(|s| s.phase).ok())
            .field("triggering", &self.record.is_triggering())
            .field("matches", &self.match_count())
            .finish_non_exhaustive()
    }
}

impl ListenExpression {
    /// Resolves `attrs` against the activation workitem. The listener starts in
    /// `Applying`; call [`activate`](Self::activate) to register it.
    pub fn new(
        ctx: ListenContext,
        id: ExpressionId,
        attrs: &ListenAttributes,
        workitem: Workitem,
        child_count: usize,
    ) -> FlowResult<Self> {
        let spec = ListenSpec::resolve(attrs, ctx.resolver.as_ref(), &workitem)?;
        let snapshot = workitem.at(id.clone());
        Ok(Self::from_record(
            ctx,
            ListenRecord::new(id, spec, snapshot, child_count),
        ))
    }

    /// Rebuilds a listener from persisted state, in `Applying`.
    #[must_use]
    pub fn from_record(ctx: ListenContext, record: ListenRecord) -> Self {
        Self {
            ctx,
            record,
            state: Mutex::new(State {
                phase: ListenPhase::Applying,
                completion: None,
                subscription: None,
            }),
            matches: AtomicU64::new(0),
        }
    }

    fn state(&self) -> FlowResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| FlowError::internal(format!("listener {} state lock poisoned", self.record.id)))
    }

    fn arm(&self) -> SubscriptionId {
        let spec = &self.record.spec;
        self.ctx.tracker.add_tracker(
            spec.scope(&self.record.id.wfid),
            spec.event_kind(),
            self.record.id.clone(),
            spec.condition(),
            TrackerAction {
                owner: self.record.id.clone(),
                flavour: self.record.flavour(),
                replace_payload: true,
            },
        )
    }

    /// Persists the record, then registers the tracker, then enters `Waiting`.
    pub fn activate(&self) -> FlowResult<SubscriptionId> {
        let mut state = self.state()?;
        if state.phase != ListenPhase::Applying {
            return Err(FlowError::internal(format!(
                "listener {} activated in phase {:?}",
                self.record.id, state.phase
            )));
        }

        // Persist first: a crash before registration is recovered by reload.
        self.ctx.store.put(&self.record)?;
        let subscription = self.arm();

        state.phase = ListenPhase::Waiting;
        state.subscription = Some(subscription);

        debug!(
            listener = %self.record.id,
            subscription = %subscription,
            kind = %self.record.spec.event_kind(),
            target = %self.record.spec.target,
            triggering = self.record.is_triggering(),
            "listener waiting"
        );
        Ok(subscription)
    }

    /// Reaction to a matching event.
    pub fn on_match(&self, delivery: &Delivery) -> FlowResult<MatchOutcome> {
        if self.state()?.phase != ListenPhase::Waiting {
            return Ok(MatchOutcome::Stale);
        }

        let incoming = delivery.payload().cloned().unwrap_or_default();

        if let Some(outcome) = self.check_guard(&incoming)? {
            return Ok(outcome);
        }

        // Every match merges into its own copy of the snapshot.
        let merged = merge(&self.record.snapshot, &incoming, self.record.spec.merge);
        self.matches.fetch_add(1, Ordering::Relaxed);

        if self.record.is_triggering() {
            let child = self.record.id.child(0);
            let seed = merged.at(child.clone());
            self.ctx
                .launcher
                .fork(&self.record.id, &child, seed, true)?;
            debug!(listener = %self.record.id, child = %child, "forked forgotten branch");
            return Ok(MatchOutcome::Forked { child });
        }

        {
            let mut state = self.state()?;
            if state.phase != ListenPhase::Waiting {
                return Ok(MatchOutcome::Stale);
            }
            state.phase = ListenPhase::Done;
            state.completion = Some(Completion::Matched);
            state.subscription = None;
        }

        self.ctx.tracker.remove_tracker(&self.record.id);
        if let Err(err) = self.ctx.store.delete(&self.record.id) {
            warn!(listener = %self.record.id, error = %err, "failed to delete listener record");
        }
        self.ctx.parent.reply(&self.record.id, merged)?;

        debug!(listener = %self.record.id, "listener resumed parent");
        Ok(MatchOutcome::Resumed)
    }

    /// `None` when the guard accepts the payload.
    fn check_guard(&self, incoming: &Workitem) -> FlowResult<Option<MatchOutcome>> {
        let Some(expression) = self.record.spec.guard.as_deref() else {
            return Ok(None);
        };

        let outcome = match self.ctx.resolver.evaluate_guard(expression, incoming) {
            Ok(true) => return Ok(None),
            Ok(false) => MatchOutcome::GuardRejected,
            Err(err) => {
                warn!(
                    listener = %self.record.id,
                    guard = expression,
                    error = %err,
                    "guard evaluation failed, treating as false"
                );
                MatchOutcome::GuardFailed
            }
        };

        // The one-shot subscription was consumed by this delivery; re-arm it.
        if !self.record.is_triggering() {
            let mut state = self.state()?;
            if state.phase == ListenPhase::Waiting {
                state.subscription = Some(self.arm());
            }
        }

        Ok(Some(outcome))
    }

    /// Restores the one-shot subscription of a blocking listener whose delivery
    /// was consumed but never reacted to. Returns whether a tracker was added.
    pub fn rearm_dropped(&self) -> FlowResult<bool> {
        if self.record.is_triggering() {
            return Ok(false);
        }
        let mut state = self.state()?;
        if state.phase != ListenPhase::Waiting {
            return Ok(false);
        }
        state.subscription = Some(self.arm());
        Ok(true)
    }

    /// Deregisters and reports cancellation to the parent.
    ///
    /// Returns false if the listener was already done. A delivery already in
    /// flight may still complete its reaction.
    pub fn cancel(&self) -> FlowResult<bool> {
        {
            let mut state = self.state()?;
            if state.phase == ListenPhase::Done {
                return Ok(false);
            }
            state.phase = ListenPhase::Done;
            state.completion = Some(Completion::Cancelled);
            state.subscription = None;
            self.ctx.tracker.remove_tracker(&self.record.id);
        }

        self.ctx.store.delete(&self.record.id)?;
        self.ctx
            .parent
            .cancelled(&self.record.id, self.record.snapshot.clone())?;

        debug!(listener = %self.record.id, "listener cancelled");
        Ok(true)
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn id(&self) -> &ExpressionId {
        &self.record.id
    }

    /// Persisted form of this listener.
    #[must_use]
    pub fn record(&self) -> &ListenRecord {
        &self.record
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn spec(&self) -> &ListenSpec {
        &self.record.spec
    }

    /// True when the listener has child steps and forks on every match.
    #[must_use]
    pub const fn is_triggering(&self) -> bool {
        self.record.is_triggering()
    }

    /// Current phase; a poisoned lock reports the last written phase.
    #[must_use]
    pub fn phase(&self) -> ListenPhase {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .phase
    }

    /// How the listener finished, once `Done`.
    #[must_use]
    pub fn completion(&self) -> Option<Completion> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .completion
    }

    /// Subscription currently held, if waiting.
    #[must_use]
    pub fn subscription(&self) -> Option<SubscriptionId> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .subscription
    }

    /// Accepted matches so far.
    #[must_use]
    pub fn match_count(&self) -> u64 {
        self.matches.load(Ordering::Relaxed)
    }
}
