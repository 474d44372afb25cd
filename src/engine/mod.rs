//! Listener host.
//!
//! The [`Engine`] owns the tracker registry for its lifetime, keeps the table of
//! live listeners, and routes every delivery the registry produces to the
//! listener that owns it. Reactions run inline on the emitting thread or on the
//! delivery pool, depending on [`EngineConfig::delivery_workers`].

mod runtime;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::error::{ExecutionError, FlowError, FlowResult, ValidationError};
use crate::executor::{Launcher, ParentChannel};
use crate::expression::{ExpressionId, ProcessId};
use crate::listen::{ListenAttributes, ListenContext, ListenExpression, ListenPhase, MatchOutcome};
use crate::resolver::{AttributeResolver, FieldResolver};
use crate::storage::{ExpressionStore, InMemoryExpressionStore};
use crate::tracker::{Delivery, DispatchReport, Event, ReactionSink, TrackerRegistry};
use crate::workitem::Workitem;

use runtime::{DeliveryPool, Handler};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delivery worker threads. Zero runs reactions inline on the emitting
    /// thread, after the registry lock is released.
    pub delivery_workers: usize,
    /// Max queued deliveries before new ones are rejected as `QueueFull`.
    pub delivery_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            delivery_workers: 2,
            delivery_queue_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Inline delivery, no worker threads.
    #[must_use]
    pub fn inline() -> Self {
        Self {
            delivery_workers: 0,
            ..Self::default()
        }
    }

    /// Rejects a zero queue capacity.
    pub fn validate(&self) -> FlowResult<()> {
        if self.delivery_queue_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "delivery_queue_capacity must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Snapshot of the engine's reaction counters.
#[allow(missing_docs)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub delivered: u64,
    pub resumed: u64,
    pub forked: u64,
    pub guard_rejected: u64,
    pub guard_failures: u64,
    pub reaction_failures: u64,
    pub stale_deliveries: u64,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    resumed: AtomicU64,
    forked: AtomicU64,
    guard_rejected: AtomicU64,
    guard_failures: AtomicU64,
    reaction_failures: AtomicU64,
    stale_deliveries: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> EngineStats {
        EngineStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            resumed: self.resumed.load(Ordering::Relaxed),
            forked: self.forked.load(Ordering::Relaxed),
            guard_rejected: self.guard_rejected.load(Ordering::Relaxed),
            guard_failures: self.guard_failures.load(Ordering::Relaxed),
            reaction_failures: self.reaction_failures.load(Ordering::Relaxed),
            stale_deliveries: self.stale_deliveries.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the engine handle and delivery workers.
struct Shared {
    ctx: ListenContext,
    listeners: RwLock<HashMap<ExpressionId, Arc<ListenExpression>>>,
    counters: Counters,
}

impl Shared {
    fn read(&self) -> FlowResult<RwLockReadGuard<'_, HashMap<ExpressionId, Arc<ListenExpression>>>> {
        self.listeners
            .read()
            .map_err(|_| FlowError::internal("listener table lock poisoned"))
    }

    fn write(&self) -> FlowResult<RwLockWriteGuard<'_, HashMap<ExpressionId, Arc<ListenExpression>>>> {
        self.listeners
            .write()
            .map_err(|_| FlowError::internal("listener table lock poisoned"))
    }

    fn lookup(&self, id: &ExpressionId) -> FlowResult<Option<Arc<ListenExpression>>> {
        Ok(self.read()?.get(id).cloned())
    }

    /// Runs the owning listener's reaction for one delivery.
    fn react(&self, delivery: &Delivery) -> FlowResult<()> {
        Counters::bump(&self.counters.delivered);

        let Some(listener) = self.lookup(delivery.owner())? else {
            Counters::bump(&self.counters.stale_deliveries);
            trace!(owner = %delivery.owner(), "delivery for unknown listener dropped");
            return Ok(());
        };

        let result = listener.on_match(delivery);
        if listener.phase() == ListenPhase::Done {
            self.write()?.remove(listener.id());
        }

        let counter = match &result {
            Ok(MatchOutcome::Resumed) => &self.counters.resumed,
            Ok(MatchOutcome::Forked { .. }) => &self.counters.forked,
            Ok(MatchOutcome::GuardRejected) => &self.counters.guard_rejected,
            Ok(MatchOutcome::GuardFailed) => &self.counters.guard_failures,
            Ok(MatchOutcome::Stale) => &self.counters.stale_deliveries,
            Err(_) => &self.counters.reaction_failures,
        };
        Counters::bump(counter);
        result.map(|_| ())
    }

    /// A delivery never reached its reaction; a blocking owner gets its
    /// subscription back.
    fn dropped(&self, delivery: &Delivery) {
        let listener = match self.lookup(delivery.owner()) {
            Ok(Some(listener)) => listener,
            Ok(None) => return,
            Err(err) => {
                warn!(owner = %delivery.owner(), error = %err, "cannot re-arm dropped delivery");
                return;
            }
        };
        match listener.rearm_dropped() {
            Ok(true) => debug!(listener = %listener.id(), "re-armed after dropped delivery"),
            Ok(false) => {}
            Err(err) => warn!(listener = %listener.id(), error = %err, "re-arm failed"),
        }
    }
}

/// Hosts listening constructs and feeds them engine events.
pub struct Engine {
    shared: Arc<Shared>,
    pool: Option<DeliveryPool>,
    config: EngineConfig,
    stopped: bool,
}

impl Engine {
    /// Creates an engine with a fresh tracker registry.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ExpressionStore>,
        resolver: Arc<dyn AttributeResolver>,
        launcher: Arc<dyn Launcher>,
        parent: Arc<dyn ParentChannel>,
    ) -> FlowResult<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            ctx: ListenContext {
                tracker: Arc::new(TrackerRegistry::new()),
                store,
                resolver,
                launcher,
                parent,
            },
            listeners: RwLock::new(HashMap::new()),
            counters: Counters::default(),
        });

        let pool = if config.delivery_workers == 0 {
            None
        } else {
            let worker = Arc::clone(&shared);
            let handler: Handler = Arc::new(move |delivery: Delivery| {
                if let Err(err) = worker.react(&delivery) {
                    warn!(owner = %delivery.owner(), error = %err, "reaction failed");
                }
            });
            let pool = DeliveryPool::start(
                config.delivery_workers,
                config.delivery_queue_capacity,
                handler,
            )
            .map_err(|e| FlowError::internal(format!("failed to start delivery workers: {e}")))?;
            Some(pool)
        };

        info!(
            delivery_workers = config.delivery_workers,
            queue_capacity = config.delivery_queue_capacity,
            "engine started"
        );
        Ok(Self {
            shared,
            pool,
            config,
            stopped: false,
        })
    }

    /// Engine backed by an in-memory store and the field resolver.
    pub fn in_memory(
        config: EngineConfig,
        launcher: Arc<dyn Launcher>,
        parent: Arc<dyn ParentChannel>,
    ) -> FlowResult<Self> {
        Self::new(
            config,
            Arc::new(InMemoryExpressionStore::new()),
            Arc::new(FieldResolver::new()),
            launcher,
            parent,
        )
    }

    /// The registry owned by this engine.
    #[must_use]
    pub fn tracker(&self) -> &Arc<TrackerRegistry> {
        &self.shared.ctx.tracker
    }

    /// Configuration the engine was started with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Applies a listening construct at `id` and leaves it waiting.
    ///
    /// `child_count == 0` makes it blocking; otherwise it is triggering.
    pub fn listen(
        &self,
        id: ExpressionId,
        attrs: &ListenAttributes,
        workitem: Workitem,
        child_count: usize,
    ) -> FlowResult<Arc<ListenExpression>> {
        if self.shared.read()?.contains_key(&id) {
            return Err(ExecutionError::DuplicateListener { id }.into());
        }
        let listener = ListenExpression::new(self.shared.ctx.clone(), id, attrs, workitem, child_count)?;
        self.install(Arc::new(listener))
    }

    /// Registers in the table before activation so no early delivery is stale.
    fn install(&self, listener: Arc<ListenExpression>) -> FlowResult<Arc<ListenExpression>> {
        {
            let mut table = self.shared.write()?;
            if table.contains_key(listener.id()) {
                return Err(ExecutionError::DuplicateListener {
                    id: listener.id().clone(),
                }
                .into());
            }
            table.insert(listener.id().clone(), Arc::clone(&listener));
        }

        if let Err(err) = listener.activate() {
            self.shared.write()?.remove(listener.id());
            return Err(err);
        }
        Ok(listener)
    }

    /// Cancels one live listener.
    ///
    /// Returns false if the listener is unknown, already cancelled or already
    /// completed; cancelling twice is a no-op.
    pub fn cancel(&self, id: &ExpressionId) -> FlowResult<bool> {
        let listener = self.shared.write()?.remove(id);
        match listener {
            Some(listener) => listener.cancel(),
            None => {
                self.shared.ctx.tracker.remove_tracker(id);
                Ok(false)
            }
        }
    }

    /// Cancels `ancestor` and every live listener below it. Returns how many
    /// were cancelled; the first error is returned after all were attempted.
    pub fn cancel_subtree(&self, ancestor: &ExpressionId) -> FlowResult<usize> {
        let doomed: Vec<Arc<ListenExpression>> = {
            let mut table = self.shared.write()?;
            let ids: Vec<ExpressionId> = table
                .keys()
                .filter(|id| id.is_descendant_of(ancestor))
                .cloned()
                .collect();
            ids.iter().filter_map(|id| table.remove(id)).collect()
        };

        let mut cancelled = 0;
        let mut first_err = None;
        for listener in doomed {
            match listener.cancel() {
                Ok(true) => cancelled += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(listener = %listener.id(), error = %err, "cancel failed");
                    first_err.get_or_insert(err);
                }
            }
        }

        debug!(ancestor = %ancestor, cancelled, "subtree cancelled");
        match first_err {
            Some(err) => Err(err),
            None => Ok(cancelled),
        }
    }

    /// Feeds one event to the registry.
    pub fn emit(&self, event: Event) -> DispatchReport {
        self.shared.ctx.tracker.dispatch_event(event, self)
    }

    /// Work dispatched to `participant`.
    pub fn emit_dispatch(&self, scope: ProcessId, participant: &str, workitem: Workitem) -> DispatchReport {
        self.emit(Event::dispatch(scope, participant, workitem))
    }

    /// Work received back from `participant`.
    pub fn emit_receive(&self, scope: ProcessId, participant: &str, workitem: Workitem) -> DispatchReport {
        self.emit(Event::receive(scope, participant, workitem))
    }

    /// Execution entered the region tagged `tag`.
    pub fn emit_tag_entered(&self, scope: ProcessId, tag: &str, workitem: Workitem) -> DispatchReport {
        self.emit(Event::tag_entered(scope, tag, workitem))
    }

    /// Execution left the region tagged `tag`.
    pub fn emit_tag_left(&self, scope: ProcessId, tag: &str, workitem: Workitem) -> DispatchReport {
        self.emit(Event::tag_left(scope, tag, workitem))
    }

    /// Re-registers every persisted listener that is not live. Returns how
    /// many were restored; the first error is returned after all records were
    /// attempted.
    pub fn reload(&self) -> FlowResult<usize> {
        let records = self.shared.ctx.store.list()?;
        let mut restored = 0;
        let mut first_err = None;
        for record in records {
            if self.shared.read()?.contains_key(&record.id) {
                continue;
            }
            let id = record.id.clone();
            let listener = ListenExpression::from_record(self.shared.ctx.clone(), record);
            match self.install(Arc::new(listener)) {
                Ok(_) => restored += 1,
                Err(err) => {
                    warn!(listener = %id, error = %err, "reload failed");
                    first_err.get_or_insert(err);
                }
            }
        }
        info!(restored, "listeners reloaded");
        match first_err {
            Some(err) => Err(err),
            None => Ok(restored),
        }
    }

    /// Live listener at `id`, if any.
    #[must_use]
    pub fn listener(&self, id: &ExpressionId) -> Option<Arc<ListenExpression>> {
        self.shared.lookup(id).ok().flatten()
    }

    /// Number of live listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.shared.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Snapshot of the delivery counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.shared.counters.snapshot()
    }

    /// Drains queued deliveries, then clears the registry and listener table.
    /// Persisted records are kept for a later [`reload`](Self::reload).
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if std::mem::replace(&mut self.stopped, true) {
            return;
        }
        if let Some(pool) = self.pool.take() {
            pool.shutdown();
        }
        self.shared.ctx.tracker.clear();
        if let Ok(mut table) = self.shared.write() {
            table.clear();
        }
        info!("engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ReactionSink for Engine {
    fn deliver(&self, delivery: Delivery) -> FlowResult<()> {
        let Some(pool) = self.pool.as_ref() else {
            return self.shared.react(&delivery);
        };
        let result = pool.try_submit(delivery.clone());
        if result.is_err() {
            self.shared.dropped(&delivery);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::listen::{Completion, ListenRecord};
    use crate::storage::StorageError;
    use crate::testing::{ParentMessage, RecordingLauncher, RecordingParent};

    struct Fixture {
        engine: Engine,
        launcher: Arc<RecordingLauncher>,
        parent: Arc<RecordingParent>,
    }

    fn fixture(config: EngineConfig) -> Fixture {
        let launcher = Arc::new(RecordingLauncher::new());
        let parent = Arc::new(RecordingParent::new());
        let engine = Engine::in_memory(config, launcher.clone(), parent.clone()).unwrap();
        Fixture {
            engine,
            launcher,
            parent,
        }
    }

    fn id(expid: &str) -> ExpressionId {
        ExpressionId::new(ProcessId::new("wf-1"), expid)
    }

    #[test]
    fn config_defaults_and_validation() {
        let config = EngineConfig::default();
        assert_eq!(config.delivery_workers, 2);
        assert_eq!(config.delivery_queue_capacity, 1024);
        assert!(config.validate().is_ok());

        let parsed: EngineConfig = serde_json::from_value(json!({"delivery_workers": 0})).unwrap();
        assert_eq!(parsed, EngineConfig::inline());

        let bad = EngineConfig {
            delivery_queue_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(bad.validate().unwrap_err().is_validation());

        let launcher = Arc::new(RecordingLauncher::new());
        let parent = Arc::new(RecordingParent::new());
        assert!(Engine::in_memory(bad, launcher, parent).is_err());
    }

    #[test]
    fn inline_blocking_listener_resumes_and_leaves_table() {
        let f = fixture(EngineConfig::inline());
        f.engine
            .listen(id("0_1"), &ListenAttributes::new().to("bob"), Workitem::new(), 0)
            .unwrap();
        assert_eq!(f.engine.listener_count(), 1);

        let report = f
            .engine
            .emit_dispatch(ProcessId::new("wf-9"), "bob", Workitem::new().with_field("x", 1));
        assert_eq!(report.delivered, 1);
        assert_eq!(f.engine.listener_count(), 0);
        assert!(f.engine.tracker().is_empty());

        let replies = f.parent.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].1.field("x"), Some(&json!(1)));

        let stats = f.engine.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.resumed, 1);
    }

    #[test]
    fn duplicate_listener_is_rejected() {
        let f = fixture(EngineConfig::inline());
        let attrs = ListenAttributes::new().to("bob");
        f.engine.listen(id("0_1"), &attrs, Workitem::new(), 0).unwrap();

        let err = f.engine.listen(id("0_1"), &attrs, Workitem::new(), 0).unwrap_err();
        assert!(matches!(
            err,
            FlowError::Execution(ExecutionError::DuplicateListener { .. })
        ));
        assert_eq!(f.engine.tracker().len(), 1);
    }

    #[test]
    fn invalid_configuration_leaves_nothing_behind() {
        let f = fixture(EngineConfig::inline());
        let err = f
            .engine
            .listen(id("0_1"), &ListenAttributes::new(), Workitem::new(), 0)
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(f.engine.listener_count(), 0);
        assert!(f.engine.tracker().is_empty());
    }

    #[test]
    fn cancel_unknown_listener_is_a_noop() {
        let f = fixture(EngineConfig::inline());
        assert!(!f.engine.cancel(&id("0_404")).unwrap());
        assert!(f.parent.cancellations().is_empty());
    }

    #[test]
    fn cancel_after_completion_is_a_noop() {
        let f = fixture(EngineConfig::inline());
        let listener = f
            .engine
            .listen(id("0_2"), &ListenAttributes::new().to("bob"), Workitem::new(), 0)
            .unwrap();
        f.engine.emit_dispatch(ProcessId::new("wf-1"), "bob", Workitem::new());
        assert_eq!(listener.completion(), Some(Completion::Matched));

        assert!(!f.engine.cancel(&id("0_2")).unwrap());
        assert!(!f.engine.cancel(&id("0_2")).unwrap());
        assert_eq!(listener.completion(), Some(Completion::Matched));
        assert!(f.parent.cancellations().is_empty());
        assert_eq!(f.parent.replies().len(), 1);
    }

    #[test]
    fn cancel_subtree_stops_descendants_only() {
        let f = fixture(EngineConfig::inline());
        let attrs = ListenAttributes::new().to("bob");
        let a = f.engine.listen(id("0_1"), &attrs, Workitem::new(), 0).unwrap();
        let b = f.engine.listen(id("0_1_0"), &attrs, Workitem::new(), 1).unwrap();
        let c = f.engine.listen(id("0_2"), &attrs, Workitem::new(), 0).unwrap();

        assert_eq!(f.engine.cancel_subtree(&id("0_1")).unwrap(), 2);
        assert_eq!(a.completion(), Some(Completion::Cancelled));
        assert_eq!(b.completion(), Some(Completion::Cancelled));
        assert_eq!(c.phase(), ListenPhase::Waiting);
        assert_eq!(f.parent.cancellations().len(), 2);
        assert_eq!(f.engine.tracker().len(), 1);
    }

    #[test]
    fn pool_delivery_runs_off_thread() {
        let f = fixture(EngineConfig {
            delivery_workers: 1,
            delivery_queue_capacity: 8,
        });
        f.engine
            .listen(id("0_3"), &ListenAttributes::new().on("review").upon("leaving"), Workitem::new(), 2)
            .unwrap();

        f.engine.emit_tag_left(ProcessId::new("wf-1"), "review", Workitem::new().with_field("n", 1));
        f.engine.emit_tag_left(ProcessId::new("wf-1"), "review", Workitem::new().with_field("n", 2));

        let first = f.launcher.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = f.launcher.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.child, id("0_3_0"));
        assert_eq!(second.child, id("0_3_0"));
        assert!(first.forget && second.forget);
        assert!(f.parent.recv_timeout(Duration::from_millis(50)).is_none());
    }

    #[test]
    fn failed_reaction_is_counted_and_isolated() {
        let f = fixture(EngineConfig::inline());
        f.launcher.set_failing(true);
        let attrs = ListenAttributes::new().to("bob");
        f.engine.listen(id("0_1"), &attrs, Workitem::new(), 1).unwrap();
        f.engine.listen(id("0_2"), &attrs, Workitem::new(), 0).unwrap();

        let report = f.engine.emit_dispatch(ProcessId::new("wf-1"), "bob", Workitem::new());
        assert_eq!(report.candidates, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);

        let stats = f.engine.stats();
        assert_eq!(stats.reaction_failures, 1);
        assert_eq!(stats.resumed, 1);
        assert!(matches!(
            f.parent.recv_timeout(Duration::from_millis(100)),
            Some(ParentMessage::Reply { .. })
        ));
    }

    #[test]
    fn reload_restores_persisted_listeners() {
        let store = Arc::new(InMemoryExpressionStore::new());
        let parent = Arc::new(RecordingParent::new());

        let first = Engine::new(
            EngineConfig::inline(),
            store.clone(),
            Arc::new(FieldResolver::new()),
            Arc::new(RecordingLauncher::new()),
            parent.clone(),
        )
        .unwrap();
        first
            .listen(id("0_1"), &ListenAttributes::new().to("/^user_/"), Workitem::new().with_field("a", 1), 0)
            .unwrap();
        first.shutdown();
        assert_eq!(store.len().unwrap(), 1);

        let second = Engine::new(
            EngineConfig::inline(),
            store.clone(),
            Arc::new(FieldResolver::new()),
            Arc::new(RecordingLauncher::new()),
            parent.clone(),
        )
        .unwrap();
        assert_eq!(second.reload().unwrap(), 1);
        assert_eq!(second.reload().unwrap(), 0);

        second.emit_dispatch(ProcessId::new("wf-7"), "user_42", Workitem::new().with_field("b", 2));
        let replies = parent.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].1.field("a"), Some(&json!(1)));
        assert_eq!(replies[0].1.field("b"), Some(&json!(2)));
        assert_eq!(store.len().unwrap(), 0);
    }

    /// Delegates to an in-memory store but refuses writes for one id.
    struct RefusingStore {
        inner: InMemoryExpressionStore,
        refused: ExpressionId,
    }

    impl ExpressionStore for RefusingStore {
        fn put(&self, record: &ListenRecord) -> Result<(), StorageError> {
            if record.id == self.refused {
                return Err(StorageError::BackendError("disk full".to_string()));
            }
            self.inner.put(record)
        }

        fn get(&self, id: &ExpressionId) -> Result<Option<ListenRecord>, StorageError> {
            self.inner.get(id)
        }

        fn delete(&self, id: &ExpressionId) -> Result<bool, StorageError> {
            self.inner.delete(id)
        }

        fn list(&self) -> Result<Vec<ListenRecord>, StorageError> {
            self.inner.list()
        }
    }

    #[test]
    fn reload_attempts_every_record_before_failing() {
        let inner = InMemoryExpressionStore::new();
        let first = Engine::new(
            EngineConfig::inline(),
            Arc::new(InMemoryExpressionStore::new()),
            Arc::new(FieldResolver::new()),
            Arc::new(RecordingLauncher::new()),
            Arc::new(RecordingParent::new()),
        )
        .unwrap();
        for expid in ["0_1", "0_2", "0_3"] {
            let listener = first
                .listen(id(expid), &ListenAttributes::new().to("bob"), Workitem::new(), 0)
                .unwrap();
            inner.put(listener.record()).unwrap();
        }
        first.shutdown();

        let store = Arc::new(RefusingStore {
            inner,
            refused: id("0_2"),
        });
        let second = Engine::new(
            EngineConfig::inline(),
            store,
            Arc::new(FieldResolver::new()),
            Arc::new(RecordingLauncher::new()),
            Arc::new(RecordingParent::new()),
        )
        .unwrap();

        let err = second.reload().unwrap_err();
        assert!(matches!(
            err,
            FlowError::Execution(ExecutionError::Storage { .. })
        ));
        assert_eq!(second.listener_count(), 2);
        assert!(second.listener(&id("0_1")).is_some());
        assert!(second.listener(&id("0_2")).is_none());
        assert!(second.listener(&id("0_3")).is_some());
        assert_eq!(second.tracker().len(), 2);
    }

    #[test]
    fn shutdown_clears_registry() {
        let f = fixture(EngineConfig::default());
        let tracker = Arc::clone(f.engine.tracker());
        f.engine
            .listen(id("0_1"), &ListenAttributes::new().to("bob"), Workitem::new(), 0)
            .unwrap();
        assert_eq!(tracker.len(), 1);
        f.engine.shutdown();
        assert!(tracker.is_empty());
    }
}
