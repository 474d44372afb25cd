//! Recording collaborators for tests and embedders.
//!
//! Both doubles keep every call in order and also push it onto an unbounded
//! channel, so callers can wait for reactions running on delivery workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::{ExecutionError, FlowResult};
use crate::executor::{Launcher, ParentChannel};
use crate::expression::ExpressionId;
use crate::workitem::Workitem;

/// One recorded `fork` call.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct ForkRecord {
    pub parent: ExpressionId,
    pub child: ExpressionId,
    pub seed: Workitem,
    pub forget: bool,
}

/// [`Launcher`] that records forks instead of starting branches.
#[derive(Debug)]
pub struct RecordingLauncher {
    forks: Mutex<Vec<ForkRecord>>,
    tx: Sender<ForkRecord>,
    rx: Receiver<ForkRecord>,
    failing: AtomicBool,
}

impl Default for RecordingLauncher {
    fn default() -> Self {
        let (tx, rx) = unbounded();
        Self {
            forks: Mutex::new(Vec::new()),
            tx,
            rx,
            failing: AtomicBool::new(false),
        }
    }
}

impl RecordingLauncher {
    /// Launcher that accepts every fork.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent forks fail with `ExecutionError::Launch`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All forks recorded so far, in call order.
    #[must_use]
    pub fn forks(&self) -> Vec<ForkRecord> {
        self.forks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Waits for the next fork not yet taken from the channel.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ForkRecord> {
        self.rx.recv_timeout(timeout).ok()
    }
}

impl Launcher for RecordingLauncher {
    fn fork(
        &self,
        parent: &ExpressionId,
        child: &ExpressionId,
        seed: Workitem,
        forget: bool,
    ) -> FlowResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ExecutionError::Launch {
                child: child.clone(),
                message: "launcher configured to fail".to_string(),
            }
            .into());
        }

        let record = ForkRecord {
            parent: parent.clone(),
            child: child.clone(),
            seed,
            forget,
        };
        self.forks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        let _ = self.tx.send(record);
        Ok(())
    }
}

/// Message observed by a [`RecordingParent`].
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum ParentMessage {
    Reply {
        from: ExpressionId,
        workitem: Workitem,
    },
    Cancelled {
        from: ExpressionId,
        workitem: Workitem,
    },
}

/// [`ParentChannel`] that records replies and cancellations.
#[derive(Debug)]
pub struct RecordingParent {
    replies: Mutex<Vec<(ExpressionId, Workitem)>>,
    cancellations: Mutex<Vec<(ExpressionId, Workitem)>>,
    tx: Sender<ParentMessage>,
    rx: Receiver<ParentMessage>,
}

impl Default for RecordingParent {
    fn default() -> Self {
        let (tx, rx) = unbounded();
        Self {
            replies: Mutex::new(Vec::new()),
            cancellations: Mutex::new(Vec::new()),
            tx,
            rx,
        }
    }
}

impl RecordingParent {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies recorded so far, in call order.
    #[must_use]
    pub fn replies(&self) -> Vec<(ExpressionId, Workitem)> {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancellations recorded so far, in call order.
    #[must_use]
    pub fn cancellations(&self) -> Vec<(ExpressionId, Workitem)> {
        self.cancellations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Waits for the next message not yet taken from the channel.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ParentMessage> {
        self.rx.recv_timeout(timeout).ok()
    }
}

impl ParentChannel for RecordingParent {
    fn reply(&self, from: &ExpressionId, workitem: Workitem) -> FlowResult<()> {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((from.clone(), workitem.clone()));
        let _ = self.tx.send(ParentMessage::Reply {
            from: from.clone(),
            workitem,
        });
        Ok(())
    }

    fn cancelled(&self, from: &ExpressionId, workitem: Workitem) -> FlowResult<()> {
        self.cancellations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((from.clone(), workitem.clone()));
        let _ = self.tx.send(ParentMessage::Cancelled {
            from: from.clone(),
            workitem,
        });
        Ok(())
    }
}
