//! Subscription and event types for the tracker.
//!
//! These types are serializable so subscriptions can be described in persisted
//! listener records and inspected by embedders.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::expression::{ExpressionId, ProcessId};
use crate::workitem::Workitem;

use super::matcher;

/// Attribute key carrying the worker name on dispatch/receive events.
pub const PARTICIPANT_NAME: &str = "participant_name";

/// Attribute key carrying the tag name on tag events.
pub const TAG: &str = "tag";

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kinds of engine activity a subscription can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// Work handed to a worker.
    Dispatch,
    /// Reply received from a worker.
    Receive,
    /// Execution entered a tagged region.
    TagEntered,
    /// Execution left a tagged region.
    TagLeft,
}

impl EventKind {
    /// All event kinds.
    pub const ALL: [Self; 4] = [Self::Dispatch, Self::Receive, Self::TagEntered, Self::TagLeft];

    /// Attribute key a listener target is matched against for this kind.
    #[must_use]
    pub const fn target_key(self) -> &'static str {
        match self {
            Self::Dispatch | Self::Receive => PARTICIPANT_NAME,
            Self::TagEntered | Self::TagLeft => TAG,
        }
    }

    /// Wire name, as used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::Receive => "receive",
            Self::TagEntered => "tag-entered",
            Self::TagLeft => "tag-left",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope guard of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "wfid", rename_all = "snake_case")]
pub enum Scope {
    /// Events from any process instance.
    Any,
    /// Only events originating in this process instance.
    Process(ProcessId),
}

/// A condition value: exact string or regular expression.
///
/// Configuration text uses `/expr/` for regexes (see [`Pattern::parse`]).
/// Serialized patterns are tagged (`{"exact": ..}` / `{"regex": ..}`), so an
/// exact value that happens to look like `/expr/` survives a round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PatternRepr", into = "PatternRepr")]
pub enum Pattern {
    /// Equal strings match.
    Exact(String),
    /// Unanchored search; anchors belong in the expression.
    Regex(Regex),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PatternRepr {
    Exact(String),
    Regex(String),
}

impl Pattern {
    /// Exact-match pattern.
    #[must_use]
    pub fn exact(value: impl Into<String>) -> Self {
        Self::Exact(value.into())
    }

    /// Compiles a regular-expression pattern.
    pub fn regex(source: &str) -> Result<Self, ValidationError> {
        matcher::cached_regex(source).map(Self::Regex)
    }

    /// Parses the string form: `/expr/` is a regex, anything else is exact.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw.strip_prefix('/').and_then(|r| r.strip_suffix('/')) {
            Some(source) if raw.len() >= 2 => Self::regex(source),
            _ => Ok(Self::exact(raw)),
        }
    }

    /// Tests a candidate value against this pattern.
    #[must_use]
    pub fn is_match(&self, candidate: &str) -> bool {
        match self {
            Self::Exact(s) => s == candidate,
            Self::Regex(re) => re.is_match(candidate),
        }
    }

    /// True for the regex form.
    #[must_use]
    pub const fn is_regex(&self) -> bool {
        matches!(self, Self::Regex(_))
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(a), Self::Exact(b)) => a == b,
            (Self::Regex(a), Self::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(s) => f.write_str(s),
            Self::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl From<Pattern> for PatternRepr {
    fn from(value: Pattern) -> Self {
        match value {
            Pattern::Exact(s) => Self::Exact(s),
            Pattern::Regex(re) => Self::Regex(re.as_str().to_string()),
        }
    }
}

impl TryFrom<PatternRepr> for Pattern {
    type Error = ValidationError;

    fn try_from(value: PatternRepr) -> Result<Self, Self::Error> {
        match value {
            PatternRepr::Exact(s) => Ok(Self::Exact(s)),
            PatternRepr::Regex(source) => Self::regex(&source),
        }
    }
}

/// Attribute-name to pattern mapping; every entry must match.
pub type Condition = BTreeMap<String, Pattern>;

/// Delivery discipline of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flavour {
    /// Removed atomically on first match.
    OneShot,
    /// Delivered on every match until removed.
    Repeatable,
}

/// Reaction descriptor attached to a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerAction {
    /// Expression the delivery is routed to.
    pub owner: ExpressionId,
    /// One-shot or repeatable.
    pub flavour: Flavour,
    /// Deliver the event's workitem as the reaction payload.
    pub replace_payload: bool,
}

/// A registered interest in future events.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub scope: Scope,
    pub event_kind: EventKind,
    pub owner: ExpressionId,
    pub condition: Condition,
    pub action: TrackerAction,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Full eligibility test: kind, scope guard and condition.
    #[must_use]
    pub fn accepts(&self, event: &Event) -> bool {
        self.event_kind == event.kind
            && matcher::scope_matches(&self.scope, &event.scope)
            && matcher::condition_matches(&self.condition, &event.attributes)
    }

    /// Delivery discipline of the attached action.
    #[must_use]
    pub const fn flavour(&self) -> Flavour {
        self.action.flavour
    }
}

/// Activity emitted by the executor.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub kind: EventKind,
    /// Originating process instance.
    pub scope: ProcessId,
    pub attributes: BTreeMap<String, String>,
    pub workitem: Workitem,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Event without attributes; the constructors below add the target key.
    #[must_use]
    pub fn new(kind: EventKind, scope: ProcessId, workitem: Workitem) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            scope,
            attributes: BTreeMap::new(),
            workitem,
            timestamp: Utc::now(),
        }
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Dispatch of work to `participant`.
    #[must_use]
    pub fn dispatch(scope: ProcessId, participant: &str, workitem: Workitem) -> Self {
        Self::new(EventKind::Dispatch, scope, workitem).with_attribute(PARTICIPANT_NAME, participant)
    }

    /// Reply received from `participant`.
    #[must_use]
    pub fn receive(scope: ProcessId, participant: &str, workitem: Workitem) -> Self {
        Self::new(EventKind::Receive, scope, workitem).with_attribute(PARTICIPANT_NAME, participant)
    }

    /// Entry into region `tag`.
    #[must_use]
    pub fn tag_entered(scope: ProcessId, tag: &str, workitem: Workitem) -> Self {
        Self::new(EventKind::TagEntered, scope, workitem).with_attribute(TAG, tag)
    }

    /// Exit from region `tag`.
    #[must_use]
    pub fn tag_left(scope: ProcessId, tag: &str, workitem: Workitem) -> Self {
        Self::new(EventKind::TagLeft, scope, workitem).with_attribute(TAG, tag)
    }
}
