//! Workitems: the payload carried through a workflow's execution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::expression::ExpressionId;

/// Workitem field mapping.
pub type Fields = Map<String, Value>;

/// Field mapping plus positional metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workitem {
    /// Expression currently holding the workitem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fei: Option<ExpressionId>,
    /// Worker (participant) the workitem was dispatched to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_name: Option<String>,
    /// Business fields.
    #[serde(default)]
    pub fields: Fields,
}

impl Workitem {
    /// Creates an empty workitem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a workitem from a JSON object. Non-object values yield no fields.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        Self {
            fields,
            ..Self::default()
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Builder-style setter for the holding expression.
    #[must_use]
    pub fn at(mut self, fei: ExpressionId) -> Self {
        self.fei = Some(fei);
        self
    }

    /// Looks up a field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Sets a field, returning the previous value.
    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }
}
