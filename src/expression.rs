//! Process and expression identifiers.
//!
//! A [`ProcessId`] names one running process instance (the "wfid"); it is the
//! scope used to restrict listeners to their own run. An [`ExpressionId`] locates
//! one expression inside that instance's expression tree, using the dotted-path
//! convention `0`, `0_1`, `0_1_0` for root, second child, and its first child.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a process instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(String);

impl ProcessId {
    /// Wraps an existing process identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a fresh random process identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProcessId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Position of an expression in a process instance's expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExpressionId {
    /// Owning process instance.
    pub wfid: ProcessId,
    /// Path of the expression in the tree (`0_1_0`).
    pub expid: String,
}

impl ExpressionId {
    /// Creates an expression id.
    #[must_use]
    pub fn new(wfid: ProcessId, expid: impl Into<String>) -> Self {
        Self {
            wfid,
            expid: expid.into(),
        }
    }

    /// Root expression of a process instance.
    #[must_use]
    pub fn root(wfid: ProcessId) -> Self {
        Self::new(wfid, "0")
    }

    /// Id of the `index`-th child of this expression.
    #[must_use]
    pub fn child(&self, index: usize) -> Self {
        Self {
            wfid: self.wfid.clone(),
            expid: format!("{}_{index}", self.expid),
        }
    }

    /// True if `self` is `ancestor` or sits below it in the same process.
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &ExpressionId) -> bool {
        if self.wfid != ancestor.wfid {
            return false;
        }
        if self.expid == ancestor.expid {
            return true;
        }
        self.expid
            .strip_prefix(ancestor.expid.as_str())
            .is_some_and(|rest| rest.starts_with('_'))
    }
}

impl fmt::Display for ExpressionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.expid, self.wfid)
    }
}
