use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use kyroflow::tracker::{PARTICIPANT_NAME, TAG};
use kyroflow::{
    Condition, Delivery, Event, EventKind, ExpressionId, Flavour, FlowResult, Pattern, ProcessId,
    Scope, TrackerAction, TrackerRegistry, Workitem,
};

fn owner(n: usize) -> ExpressionId {
    ExpressionId::new(ProcessId::new("wf"), format!("0_{n}"))
}

fn condition(key: &str, pattern: Pattern) -> Condition {
    [(key.to_string(), pattern)].into_iter().collect()
}

fn add(registry: &TrackerRegistry, n: usize, kind: EventKind, cond: Condition, flavour: Flavour) {
    registry.add_tracker(
        Scope::Any,
        kind,
        owner(n),
        cond,
        TrackerAction {
            owner: owner(n),
            flavour,
            replace_payload: true,
        },
    );
}

#[test]
fn one_shot_is_delivered_exactly_once_under_contention() {
    for _round in 0..20 {
        let registry = Arc::new(TrackerRegistry::new());
        add(
            &registry,
            1,
            EventKind::Dispatch,
            condition(PARTICIPANT_NAME, Pattern::exact("bob")),
            Flavour::OneShot,
        );

        let delivered = Arc::new(AtomicUsize::new(0));
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let delivered = Arc::clone(&delivered);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let report = registry.dispatch_event(
                        Event::dispatch(ProcessId::new("wf"), "bob", Workitem::new()),
                        &|_d: Delivery| -> FlowResult<()> {
                            delivered.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        },
                    );
                    report.delivered
                })
            })
            .collect();

        let reported: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        assert_eq!(reported, 1);
        assert!(registry.is_empty());
    }
}

#[test]
fn repeatable_sees_every_event_from_every_thread() {
    let registry = Arc::new(TrackerRegistry::new());
    add(
        &registry,
        1,
        EventKind::TagEntered,
        condition(TAG, Pattern::regex("^stage-").unwrap()),
        Flavour::Repeatable,
    );

    let delivered = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let registry = Arc::clone(&registry);
            let delivered = Arc::clone(&delivered);
            thread::spawn(move || {
                for i in 0..50 {
                    registry.dispatch_event(
                        Event::tag_entered(ProcessId::new("wf"), &format!("stage-{t}-{i}"), Workitem::new()),
                        &|_d: Delivery| -> FlowResult<()> {
                            delivered.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        },
                    );
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(delivered.load(Ordering::SeqCst), 200);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.delivered(), 200);
}

#[test]
fn add_and_remove_race_with_dispatch() {
    let registry = Arc::new(TrackerRegistry::new());
    let writers: Vec<_> = (0..4)
        .map(|t| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for i in 0..100 {
                    let n = t * 1000 + i;
                    add(
                        &registry,
                        n,
                        EventKind::Receive,
                        condition(PARTICIPANT_NAME, Pattern::exact("alice")),
                        Flavour::Repeatable,
                    );
                    if i % 2 == 0 {
                        assert_eq!(registry.remove_tracker(&owner(n)), 1);
                    }
                }
            })
        })
        .collect();

    let dispatcher = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            for _ in 0..200 {
                let report = registry.dispatch_event(
                    Event::receive(ProcessId::new("wf"), "alice", Workitem::new()),
                    &|_d: Delivery| -> FlowResult<()> { Ok(()) },
                );
                assert_eq!(report.failed, 0);
            }
        })
    };

    for h in writers {
        h.join().unwrap();
    }
    dispatcher.join().unwrap();

    assert_eq!(registry.len(), 200);
    let report = registry.dispatch_event(
        Event::receive(ProcessId::new("wf"), "alice", Workitem::new()),
        &|_d: Delivery| -> FlowResult<()> { Ok(()) },
    );
    assert_eq!(report.delivered, 200);
}

#[test]
fn failing_sink_does_not_stop_other_deliveries() {
    let registry = TrackerRegistry::new();
    for n in 0..5 {
        add(
            &registry,
            n,
            EventKind::Dispatch,
            condition(PARTICIPANT_NAME, Pattern::exact("bob")),
            Flavour::OneShot,
        );
    }

    let poisoned = owner(2);
    let report = registry.dispatch_event(
        Event::dispatch(ProcessId::new("wf"), "bob", Workitem::new()),
        &|d: Delivery| -> FlowResult<()> {
            if d.owner() == &poisoned {
                return Err(kyroflow::FlowError::internal("reaction exploded"));
            }
            Ok(())
        },
    );

    assert_eq!(report.candidates, 5);
    assert_eq!(report.delivered, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(registry.failed_deliveries(), 1);
    // One-shots are consumed even when their reaction fails.
    assert!(registry.is_empty());
}
