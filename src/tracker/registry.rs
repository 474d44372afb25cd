//! Tracker registry.
//!
//! This module owns subscription records and dispatches events to the ones that
//! match. Matching runs under a shared read lock; the only exclusive section on
//! the dispatch path is the test-and-remove of one-shot candidates. Reactions are
//! handed to a [`ReactionSink`] after every lock has been released.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, trace, warn};

use crate::error::FlowResult;
use crate::expression::ExpressionId;
use crate::workitem::Workitem;

use super::triggers::{
    Condition, Event, EventKind, Flavour, Scope, Subscription, SubscriptionId, TrackerAction,
};

/// One matched subscription paired with the event that matched it.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Subscription that matched; already removed if one-shot.
    pub subscription: Arc<Subscription>,
    /// Event shared by every delivery it produced.
    pub event: Arc<Event>,
}

impl Delivery {
    /// Expression the delivery is addressed to.
    #[must_use]
    pub fn owner(&self) -> &ExpressionId {
        &self.subscription.action.owner
    }

    /// Reaction payload: the event workitem when the action asks for it.
    #[must_use]
    pub fn payload(&self) -> Option<&Workitem> {
        self.subscription
            .action
            .replace_payload
            .then_some(&self.event.workitem)
    }
}

/// Receives matched deliveries.
///
/// Implementations either run the reaction inline or queue it; an error marks
/// this single delivery as failed and never stops the dispatch loop.
pub trait ReactionSink: Send + Sync {
    /// Deliver one match.
    fn deliver(&self, delivery: Delivery) -> FlowResult<()>;
}

impl<F> ReactionSink for F
where
    F: Fn(Delivery) -> FlowResult<()> + Send + Sync,
{
    fn deliver(&self, delivery: Delivery) -> FlowResult<()> {
        self(delivery)
    }
}

/// Outcome counters for a single `dispatch_event` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Subscriptions whose kind, scope and condition matched.
    pub candidates: usize,
    /// Deliveries accepted by the sink.
    pub delivered: usize,
    /// One-shot candidates already consumed by a concurrent dispatch.
    pub consumed: usize,
    /// Deliveries the sink rejected.
    pub failed: usize,
}

#[derive(Debug, Default)]
struct TrackerTable {
    subs: HashMap<SubscriptionId, Arc<Subscription>>,
    by_kind: HashMap<EventKind, HashSet<SubscriptionId>>,
    by_owner: HashMap<ExpressionId, HashSet<SubscriptionId>>,
}

impl TrackerTable {
    fn insert(&mut self, sub: Arc<Subscription>) {
        self.by_kind.entry(sub.event_kind).or_default().insert(sub.id);
        self.by_owner
            .entry(sub.owner.clone())
            .or_default()
            .insert(sub.id);
        self.subs.insert(sub.id, sub);
    }

    fn remove(&mut self, id: SubscriptionId) -> Option<Arc<Subscription>> {
        let sub = self.subs.remove(&id)?;

        if let Some(ids) = self.by_kind.get_mut(&sub.event_kind) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_kind.remove(&sub.event_kind);
            }
        }
        if let Some(ids) = self.by_owner.get_mut(&sub.owner) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_owner.remove(&sub.owner);
            }
        }

        Some(sub)
    }

    fn candidates(&self, event: &Event) -> Vec<Arc<Subscription>> {
        let Some(ids) = self.by_kind.get(&event.kind) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.subs.get(id))
            .filter(|sub| sub.accepts(event))
            .cloned()
            .collect()
    }
}

/// Process-wide subscription table.
///
/// Created once per engine and shared by every listener through an `Arc`.
/// All operations are safe to call concurrently from any thread.
#[derive(Debug, Default)]
pub struct TrackerRegistry {
    table: RwLock<TrackerTable>,
    delivered: AtomicU64,
    failed_deliveries: AtomicU64,
}

impl TrackerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Every mutation is a single insert/remove, so a poisoned table is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, TrackerTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TrackerTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a subscription. Always succeeds.
    pub fn add_tracker(
        &self,
        scope: Scope,
        event_kind: EventKind,
        owner: ExpressionId,
        condition: Condition,
        action: TrackerAction,
    ) -> SubscriptionId {
        let sub = Subscription {
            id: SubscriptionId::new(),
            scope,
            event_kind,
            owner,
            condition,
            action,
            created_at: Utc::now(),
        };
        let id = sub.id;

        debug!(
            subscription = %id,
            owner = %sub.owner,
            kind = %event_kind,
            flavour = ?sub.action.flavour,
            "tracker added"
        );

        self.write().insert(Arc::new(sub));
        id
    }

    /// Removes every subscription owned by `owner`; returns how many went away.
    ///
    /// Idempotent: unknown owners are a no-op.
    pub fn remove_tracker(&self, owner: &ExpressionId) -> usize {
        let mut table = self.write();
        let ids: Vec<SubscriptionId> = table
            .by_owner
            .get(owner)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();

        let removed = ids
            .into_iter()
            .filter(|id| table.remove(*id).is_some())
            .count();

        if removed > 0 {
            debug!(owner = %owner, removed, "trackers removed");
        }
        removed
    }

    /// Removes a single subscription by id. Returns false if it was not present.
    pub fn remove_subscription(&self, id: SubscriptionId) -> bool {
        self.write().remove(id).is_some()
    }

    /// Delivers `event` to every matching subscription.
    ///
    /// One-shot candidates are removed in one exclusive step before anything is
    /// delivered; a candidate that is already gone lost the race to a concurrent
    /// dispatch and is skipped. Repeatable candidates stay registered.
    pub fn dispatch_event(&self, event: Event, sink: &dyn ReactionSink) -> DispatchReport {
        let event = Arc::new(event);
        let candidates = self.read().candidates(&event);

        let mut report = DispatchReport {
            candidates: candidates.len(),
            ..DispatchReport::default()
        };
        if candidates.is_empty() {
            trace!(event = %event.event_id, kind = %event.kind, "no matching trackers");
            return report;
        }

        let (one_shot, repeatable): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|sub| sub.flavour() == Flavour::OneShot);

        let mut winners = repeatable;
        if !one_shot.is_empty() {
            let mut table = self.write();
            for sub in one_shot {
                if table.remove(sub.id).is_some() {
                    winners.push(sub);
                } else {
                    report.consumed += 1;
                }
            }
        }

        for sub in winners {
            trace!(
                event = %event.event_id,
                subscription = %sub.id,
                owner = %sub.owner,
                "delivering"
            );
            let delivery = Delivery {
                subscription: Arc::clone(&sub),
                event: Arc::clone(&event),
            };
            match sink.deliver(delivery) {
                Ok(()) => {
                    report.delivered += 1;
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    report.failed += 1;
                    self.failed_deliveries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        subscription = %sub.id,
                        owner = %sub.owner,
                        error = %err,
                        "reaction delivery failed"
                    );
                }
            }
        }

        report
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().subs.len()
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().subs.is_empty()
    }

    /// Whether subscription `id` is still registered.
    #[must_use]
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.read().subs.contains_key(&id)
    }

    /// Live subscriptions owned by `owner`.
    #[must_use]
    pub fn subscriptions_for(&self, owner: &ExpressionId) -> Vec<Arc<Subscription>> {
        let table = self.read();
        table
            .by_owner
            .get(owner)
            .map(|ids| ids.iter().filter_map(|id| table.subs.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    /// Drops every subscription (engine teardown).
    pub fn clear(&self) {
        let mut table = self.write();
        let n = table.subs.len();
        *table = TrackerTable::default();
        debug!(removed = n, "tracker registry cleared");
    }

    /// Deliveries accepted by a sink since creation.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Deliveries whose sink returned an error since creation.
    #[must_use]
    pub fn failed_deliveries(&self) -> u64 {
        self.failed_deliveries.load(Ordering::Relaxed)
    }
}
