//! Delivery worker pool.
//!
//! Reactions can be slow (launching branches, replying to parents), and the
//! dispatch loop must never wait on them. This module provides a small,
//! bounded, thread-based pool that runs reactions off the emitting thread.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::debug;

use crate::error::{ExecutionError, FlowResult};
use crate::tracker::Delivery;

/// Reaction run by every worker for each queued delivery.
pub(crate) type Handler = Arc<dyn Fn(Delivery) + Send + Sync>;

enum Job {
    React(Delivery),

    #[cfg(test)]
    Sleep {
        duration: std::time::Duration,
        reply: Sender<()>,
    },
}

/// Bounded pool of named delivery workers.
pub(crate) struct DeliveryPool {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl DeliveryPool {
    /// Spawns `workers` threads (at least one) sharing a queue of
    /// `queue_capacity` slots.
    pub(crate) fn start(workers: usize, queue_capacity: usize, handler: Handler) -> io::Result<Self> {
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity);

        let mut pool = Self {
            tx: Some(tx),
            workers: Vec::with_capacity(workers),
            queue_capacity,
        };

        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let handler = Arc::clone(&handler);
            // On failure `pool` is dropped, which joins the workers already running.
            let handle = thread::Builder::new()
                .name(format!("kyroflow-delivery-{idx}"))
                .spawn(move || loop {
                    match rx.recv() {
                        Ok(Job::React(delivery)) => handler(delivery),
                        Err(_) => break,

                        #[cfg(test)]
                        Ok(Job::Sleep { duration, reply }) => {
                            thread::sleep(duration);
                            let _ = reply.send(());
                        }
                    }
                })?;
            pool.workers.push(handle);
        }

        debug!(workers, queue_capacity, "delivery pool started");
        Ok(pool)
    }

    fn try_send(&self, job: Job) -> FlowResult<()> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(ExecutionError::Disconnected {
                path: "delivery".to_string(),
            }
            .into());
        };
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ExecutionError::QueueFull {
                capacity: self.queue_capacity,
            }
            .into()),
            Err(TrySendError::Disconnected(_)) => Err(ExecutionError::Disconnected {
                path: "delivery".to_string(),
            }
            .into()),
        }
    }

    /// Queues a delivery without blocking.
    pub(crate) fn try_submit(&self, delivery: Delivery) -> FlowResult<()> {
        self.try_send(Job::React(delivery))
    }

    #[cfg(test)]
    fn worker_count(&self) -> usize {
        self.workers.len()
    }

    #[cfg(test)]
    const fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Closes the queue; workers drain queued jobs, then exit and are joined.
    fn close(&mut self) {
        drop(self.tx.take());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }

    pub(crate) fn shutdown(mut self) {
        self.close();
        debug!("delivery pool stopped");
    }

    #[cfg(test)]
    fn submit_sleep(&self, duration: std::time::Duration) -> FlowResult<Receiver<()>> {
        let (tx, rx) = bounded::<()>(1);
        self.try_send(Job::Sleep { duration, reply: tx })?;
        Ok(rx)
    }
}

impl Drop for DeliveryPool {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::error::FlowError;
    use crate::expression::{ExpressionId, ProcessId};
    use crate::tracker::{Event, TrackerRegistry, TrackerAction, Flavour, Scope, EventKind, Pattern, PARTICIPANT_NAME};
    use crate::workitem::Workitem;

    /// Produces one real delivery by dispatching through a registry.
    fn delivery() -> Delivery {
        let registry = TrackerRegistry::new();
        let owner = ExpressionId::new(ProcessId::new("wf"), "0_1");
        registry.add_tracker(
            Scope::Any,
            EventKind::Dispatch,
            owner.clone(),
            [(PARTICIPANT_NAME.to_string(), Pattern::exact("bob"))].into_iter().collect(),
            TrackerAction {
                owner,
                flavour: Flavour::Repeatable,
                replace_payload: true,
            },
        );
        let captured = std::sync::Mutex::new(None);
        registry.dispatch_event(
            Event::dispatch(ProcessId::new("wf"), "bob", Workitem::new()),
            &|d: Delivery| -> FlowResult<()> {
                *captured.lock().unwrap() = Some(d);
                Ok(())
            },
        );
        captured.into_inner().unwrap().unwrap()
    }

    #[test]
    fn workers_run_every_queued_delivery_before_shutdown() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let pool = DeliveryPool::start(
            2,
            16,
            Arc::new(move |_d: Delivery| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        assert_eq!(pool.worker_count(), 2);

        let d = delivery();
        for _ in 0..10 {
            pool.try_submit(d.clone()).unwrap();
        }
        pool.shutdown();
        assert_eq!(seen.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn full_queue_is_reported_without_blocking() {
        let pool = DeliveryPool::start(1, 1, Arc::new(|_d: Delivery| {})).unwrap();
        assert_eq!(pool.queue_capacity(), 1);

        // Occupy the single worker, then fill the single slot.
        let sleeping = pool.submit_sleep(Duration::from_millis(200)).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        pool.try_submit(delivery()).unwrap();

        let err = pool.try_submit(delivery()).unwrap_err();
        assert!(matches!(
            err,
            FlowError::Execution(ExecutionError::QueueFull { capacity: 1 })
        ));
        assert!(err.is_retryable());

        sleeping.recv_timeout(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn zero_sizes_are_clamped() {
        let pool = DeliveryPool::start(0, 0, Arc::new(|_d: Delivery| {})).unwrap();
        assert_eq!(pool.worker_count(), 1);
        assert_eq!(pool.queue_capacity(), 1);
    }
}
