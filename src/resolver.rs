//! Attribute and guard resolution.
//!
//! Listener attributes may reference workitem fields (`${f:customer}`), and the
//! optional `where` guard is a boolean expression over the incoming payload.
//! The full resolution language belongs to the host engine; KyroFlow only
//! depends on the narrow [`AttributeResolver`] contract.
//!
//! [`FieldResolver`] is a deliberately small stand-in: `${name}` / `${f:name}`
//! interpolation of top-level fields, and guards of the form `a == b`, `a != b`
//! or a single operand tested for truthiness.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::error::{ExecutionError, FlowResult};
use crate::workitem::Workitem;

/// Resolves raw attribute text and evaluates guards against a workitem.
pub trait AttributeResolver: Send + Sync {
    /// Resolves a raw attribute specification to its final string value.
    fn resolve(&self, raw: &str, workitem: &Workitem) -> FlowResult<String>;

    /// Evaluates a guard expression. Errors mean "could not evaluate".
    fn evaluate_guard(&self, expression: &str, workitem: &Workitem) -> FlowResult<bool>;
}

/// Minimal `${field}` resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldResolver;

impl FieldResolver {
    /// Creates the resolver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn interpolation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{(?:f:)?([^}]*)\}").expect("interpolation regex is valid"))
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn field_of<'a>(caps: &Captures<'_>, workitem: &'a Workitem) -> (String, Option<&'a Value>) {
    let key = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();
    let value = workitem.field(&key);
    (key, value)
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

fn is_truthy(s: &str) -> bool {
    !matches!(s, "" | "false" | "nil" | "null")
}

impl AttributeResolver for FieldResolver {
    fn resolve(&self, raw: &str, workitem: &Workitem) -> FlowResult<String> {
        let out = interpolation().replace_all(raw, |caps: &Captures<'_>| {
            field_of(caps, workitem).1.map(render).unwrap_or_default()
        });
        Ok(out.into_owned())
    }

    fn evaluate_guard(&self, expression: &str, workitem: &Workitem) -> FlowResult<bool> {
        for caps in interpolation().captures_iter(expression) {
            let (key, value) = field_of(&caps, workitem);
            if value.is_none() {
                return Err(ExecutionError::UnknownField { field: key }.into());
            }
        }

        // Operators are found in the raw text; field values never change the parse.
        let operand = |raw: &str| -> FlowResult<String> {
            Ok(unquote(&self.resolve(unquote(raw), workitem)?).to_string())
        };

        if let Some((lhs, rhs)) = expression.split_once("!=") {
            return Ok(operand(lhs)? != operand(rhs)?);
        }
        if let Some((lhs, rhs)) = expression.split_once("==") {
            return Ok(operand(lhs)? == operand(rhs)?);
        }
        Ok(is_truthy(&operand(expression)?))
    }
}
