//! Collaborator contracts toward the surrounding workflow executor.
//!
//! The listener never drives the process tree itself: it forks branches through
//! a [`Launcher`] and hands its completion (or cancellation) to its parent
//! through a [`ParentChannel`].

use crate::error::FlowResult;
use crate::expression::ExpressionId;
use crate::workitem::Workitem;

/// Starts sub-branches of a process instance.
pub trait Launcher: Send + Sync {
    /// Starts `child` under `parent`, seeded with `seed`.
    ///
    /// With `forget` set the creator neither awaits nor tracks the branch.
    fn fork(
        &self,
        parent: &ExpressionId,
        child: &ExpressionId,
        seed: Workitem,
        forget: bool,
    ) -> FlowResult<()>;
}

/// Reports an expression's outcome to its parent.
pub trait ParentChannel: Send + Sync {
    /// `from` completed with `workitem` as its result.
    fn reply(&self, from: &ExpressionId, workitem: Workitem) -> FlowResult<()>;

    /// `from` was cancelled; `workitem` is its unchanged snapshot.
    fn cancelled(&self, from: &ExpressionId, workitem: Workitem) -> FlowResult<()>;
}
