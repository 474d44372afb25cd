//! Condition and scope matching for the tracker.
//!
//! Everything here is a pure predicate over immutable inputs, so the registry
//! evaluates it under a shared read lock and dispatches may run concurrently.

use std::collections::{BTreeMap, HashMap};
use std::sync::{OnceLock, RwLock};

use regex::Regex;

use crate::error::ValidationError;
use crate::expression::ProcessId;

use super::triggers::{Condition, Scope};

const REGEX_CACHE_MAX: usize = 1024;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

/// Compiles `pattern`, reusing a process-wide bounded cache.
pub(crate) fn cached_regex(pattern: &str) -> Result<Regex, ValidationError> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    if let Ok(guard) = cache.read() {
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let compiled = Regex::new(pattern).map_err(|e| ValidationError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    // A poisoned cache only costs a recompile next time.
    if let Ok(mut guard) = cache.write() {
        if guard.len() >= REGEX_CACHE_MAX {
            guard.clear();
        }
        guard
            .entry(pattern.to_string())
            .or_insert_with(|| compiled.clone());
    }

    Ok(compiled)
}

/// True if every condition entry is present in `attributes` and matches.
///
/// An empty condition matches anything.
#[must_use]
pub fn condition_matches(condition: &Condition, attributes: &BTreeMap<String, String>) -> bool {
    condition.iter().all(|(key, pattern)| {
        attributes
            .get(key)
            .is_some_and(|value| pattern.is_match(value))
    })
}

/// True if the subscription scope is wildcard or equals the event scope.
#[must_use]
pub fn scope_matches(subscription_scope: &Scope, event_scope: &ProcessId) -> bool {
    match subscription_scope {
        Scope::Any => true,
        Scope::Process(wfid) => wfid == event_scope,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::triggers::{Pattern, PARTICIPANT_NAME, TAG};

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn condition(key: &str, raw: &str) -> Condition {
        let mut c = Condition::new();
        c.insert(key.to_string(), Pattern::parse(raw).unwrap());
        c
    }

    #[test]
    fn empty_condition_matches_anything() {
        assert!(condition_matches(&Condition::new(), &attrs(&[])));
        assert!(condition_matches(&Condition::new(), &attrs(&[("tag", "x")])));
    }

    #[test]
    fn missing_key_is_a_non_match() {
        let c = condition(PARTICIPANT_NAME, "bob");
        assert!(!condition_matches(&c, &attrs(&[(TAG, "bob")])));
    }

    #[test]
    fn exact_pattern() {
        let c = condition(PARTICIPANT_NAME, "bob");
        assert!(condition_matches(&c, &attrs(&[(PARTICIPANT_NAME, "bob")])));
        assert!(!condition_matches(&c, &attrs(&[(PARTICIPANT_NAME, "bobby")])));
    }

    #[test]
    fn regex_pattern() {
        let c = condition(PARTICIPANT_NAME, "/^user_.+/");
        assert!(condition_matches(&c, &attrs(&[(PARTICIPANT_NAME, "user_42")])));
        assert!(condition_matches(&c, &attrs(&[(PARTICIPANT_NAME, "user_anything")])));
        assert!(!condition_matches(&c, &attrs(&[(PARTICIPANT_NAME, "admin_1")])));
    }

    #[test]
    fn all_entries_must_match() {
        let mut c = condition(PARTICIPANT_NAME, "bob");
        c.insert("queue".to_string(), Pattern::exact("fast"));
        assert!(condition_matches(
            &c,
            &attrs(&[(PARTICIPANT_NAME, "bob"), ("queue", "fast")])
        ));
        assert!(!condition_matches(
            &c,
            &attrs(&[(PARTICIPANT_NAME, "bob"), ("queue", "slow")])
        ));
    }

    #[test]
    fn scope_guard() {
        let wf = ProcessId::new("wf-1");
        assert!(scope_matches(&Scope::Any, &wf));
        assert!(scope_matches(&Scope::Process(wf.clone()), &wf));
        assert!(!scope_matches(&Scope::Process(wf), &ProcessId::new("wf-2")));
    }

    #[test]
    fn cached_regex_reports_invalid_patterns() {
        assert!(cached_regex("^ok$").is_ok());
        assert!(matches!(
            cached_regex("(unclosed"),
            Err(ValidationError::InvalidRegex { .. })
        ));
    }
}
