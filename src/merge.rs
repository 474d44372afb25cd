//! Merge strategies combining a listener's snapshot with an incoming payload.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::workitem::Workitem;

/// How incoming event fields are combined with the listener's snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Union of both field sets; incoming values win on conflict.
    #[default]
    Merge,
    /// Incoming fields replace the snapshot's fields wholesale.
    Override,
    /// Snapshot is left untouched.
    Ignore,
}

impl MergePolicy {
    /// Wire-level token for this policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Merge => "true",
            Self::Override => "override",
            Self::Ignore => "false",
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergePolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "true" | "merge" => Ok(Self::Merge),
            "override" => Ok(Self::Override),
            "false" | "none" | "ignore" => Ok(Self::Ignore),
            other => Err(ValidationError::UnknownMergePolicy {
                value: other.to_string(),
            }),
        }
    }
}

/// Combines `base` and `incoming` according to `policy`.
///
/// Positional metadata (`fei`, `participant_name`) always comes from `base`.
#[must_use]
pub fn merge(base: &Workitem, incoming: &Workitem, policy: MergePolicy) -> Workitem {
    let mut out = base.clone();
    match policy {
        MergePolicy::Merge => {
            for (k, v) in &incoming.fields {
                out.fields.insert(k.clone(), v.clone());
            }
        }
        MergePolicy::Override => {
            out.fields = incoming.fields.clone();
        }
        MergePolicy::Ignore => {}
    }
    out
}
