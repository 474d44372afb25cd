//! Listener configuration.
//!
//! [`ListenAttributes`] is the raw, loosely typed attribute set a process
//! definition carries. It is resolved exactly once, at activation, into a
//! [`ListenSpec`]; every invalid value is rejected there so nothing can fail
//! at match time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FlowResult, ValidationError};
use crate::expression::ProcessId;
use crate::merge::MergePolicy;
use crate::resolver::AttributeResolver;
use crate::tracker::{Condition, EventKind, Pattern, Scope};
use crate::workitem::Workitem;

/// `wfid` tokens restricting a listener to its own process instance.
const SAME_PROCESS_TOKENS: [&str; 3] = ["same", "current", "true"];

/// A raw attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Boolean token (`merge: false`, `wfid: true`).
    Bool(bool),
    /// Text, possibly containing `${…}` references and `/regex/` literals.
    Text(String),
    /// Explicit regular expression.
    Regex { regex: String },
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Raw listener attributes as found in a process definition.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<AttributeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<AttributeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upon: Option<AttributeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<AttributeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wfid: Option<AttributeValue>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
}

impl ListenAttributes {
    /// Empty attribute set; `to` or `on` must be added before use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker or tag name (`to` spelling).
    #[must_use]
    pub fn to(mut self, target: impl Into<AttributeValue>) -> Self {
        self.to = Some(target.into());
        self
    }

    /// Sets the worker or tag name (`on` spelling).
    #[must_use]
    pub fn on(mut self, target: impl Into<AttributeValue>) -> Self {
        self.on = Some(target.into());
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn upon(mut self, upon: impl Into<AttributeValue>) -> Self {
        self.upon = Some(upon.into());
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn merge(mut self, merge: impl Into<AttributeValue>) -> Self {
        self.merge = Some(merge.into());
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn wfid(mut self, wfid: impl Into<AttributeValue>) -> Self {
        self.wfid = Some(wfid.into());
        self
    }

    /// Sets the `where` guard evaluated against each incoming payload.
    #[must_use]
    pub fn guard(mut self, expression: impl Into<String>) -> Self {
        self.guard = Some(expression.into());
        self
    }
}

/// What the listener waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Upon {
    /// Work dispatched to a worker.
    #[default]
    Apply,
    /// Reply received from a worker.
    Reply,
    /// Entry into a tagged region.
    Entering,
    /// Exit from a tagged region.
    Leaving,
}

impl Upon {
    /// Event kind this mode listens for.
    #[must_use]
    pub const fn event_kind(self) -> EventKind {
        match self {
            Self::Apply => EventKind::Dispatch,
            Self::Reply => EventKind::Receive,
            Self::Entering => EventKind::TagEntered,
            Self::Leaving => EventKind::TagLeft,
        }
    }

    /// Configuration token for this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Reply => "reply",
            Self::Entering => "entering",
            Self::Leaving => "leaving",
        }
    }
}

impl fmt::Display for Upon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Upon {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apply" => Ok(Self::Apply),
            "reply" => Ok(Self::Reply),
            "entering" => Ok(Self::Entering),
            "leaving" => Ok(Self::Leaving),
            other => Err(ValidationError::UnknownUpon {
                value: other.to_string(),
            }),
        }
    }
}

/// Fully resolved, strongly typed listener configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenSpec {
    /// Worker or tag name to match.
    pub target: Pattern,
    /// What the listener waits for.
    pub upon: Upon,
    /// How the incoming payload is merged into the snapshot.
    pub merge: MergePolicy,
    /// Restrict matching to the listener's own process instance.
    pub same_process: bool,
    /// Optional `where` guard, evaluated against each incoming payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
}

impl ListenSpec {
    /// Resolves raw attributes against the activation workitem.
    pub fn resolve(
        attrs: &ListenAttributes,
        resolver: &dyn AttributeResolver,
        workitem: &Workitem,
    ) -> FlowResult<Self> {
        let target = resolve_target(attrs, resolver, workitem)?;

        let upon = match &attrs.upon {
            None => Upon::default(),
            Some(AttributeValue::Text(raw)) => resolver.resolve(raw, workitem)?.parse::<Upon>()?,
            Some(other) => {
                return Err(ValidationError::UnknownUpon {
                    value: describe(other),
                }
                .into())
            }
        };

        let merge = match &attrs.merge {
            None => MergePolicy::default(),
            Some(AttributeValue::Bool(true)) => MergePolicy::Merge,
            Some(AttributeValue::Bool(false)) => MergePolicy::Ignore,
            Some(AttributeValue::Text(raw)) => {
                resolver.resolve(raw, workitem)?.parse::<MergePolicy>()?
            }
            Some(other @ AttributeValue::Regex { .. }) => {
                return Err(ValidationError::UnknownMergePolicy {
                    value: describe(other),
                }
                .into())
            }
        };

        let same_process = match &attrs.wfid {
            Some(AttributeValue::Bool(b)) => *b,
            Some(AttributeValue::Text(raw)) => {
                let token = resolver.resolve(raw, workitem)?.trim().to_ascii_lowercase();
                SAME_PROCESS_TOKENS.contains(&token.as_str())
            }
            Some(AttributeValue::Regex { .. }) | None => false,
        };

        let guard = attrs
            .guard
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string);

        Ok(Self {
            target,
            upon,
            merge,
            same_process,
            guard,
        })
    }

    /// Event kind the tracker is registered for.
    #[must_use]
    pub const fn event_kind(&self) -> EventKind {
        self.upon.event_kind()
    }

    /// `{participant_name: target}` or `{tag: target}` depending on the kind.
    #[must_use]
    pub fn condition(&self) -> Condition {
        let mut condition = Condition::new();
        condition.insert(
            self.event_kind().target_key().to_string(),
            self.target.clone(),
        );
        condition
    }

    /// Scope guard for a listener living in process `wfid`.
    #[must_use]
    pub fn scope(&self, wfid: &ProcessId) -> Scope {
        if self.same_process {
            Scope::Process(wfid.clone())
        } else {
            Scope::Any
        }
    }
}

fn describe(value: &AttributeValue) -> String {
    match value {
        AttributeValue::Bool(b) => b.to_string(),
        AttributeValue::Text(s) => s.clone(),
        AttributeValue::Regex { regex } => format!("/{regex}/"),
    }
}

fn resolve_target(
    attrs: &ListenAttributes,
    resolver: &dyn AttributeResolver,
    workitem: &Workitem,
) -> FlowResult<Pattern> {
    let (field, raw) = match (&attrs.to, &attrs.on) {
        (Some(_), Some(_)) => {
            return Err(ValidationError::AmbiguousField {
                first: "to".to_string(),
                second: "on".to_string(),
            }
            .into())
        }
        (Some(v), None) => ("to", v),
        (None, Some(v)) => ("on", v),
        (None, None) => {
            return Err(ValidationError::MissingField {
                field: "to".to_string(),
            }
            .into())
        }
    };

    match raw {
        AttributeValue::Bool(_) => Err(ValidationError::InvalidAttribute {
            field: field.to_string(),
            reason: "expected a worker or tag name".to_string(),
        }
        .into()),
        AttributeValue::Regex { regex } => {
            let source = resolver.resolve(regex, workitem)?;
            Ok(Pattern::regex(&source)?)
        }
        AttributeValue::Text(text) => {
            let resolved = resolver.resolve(text, workitem)?;
            let resolved = resolved.trim();
            if resolved.is_empty() {
                return Err(ValidationError::EmptyTarget.into());
            }
            Ok(Pattern::parse(resolved)?)
        }
    }
}
