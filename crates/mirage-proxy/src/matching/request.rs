//! Whole-rule evaluation against one request.

use super::field::matches_all;
use crate::models::{constrained, constrained_map, FieldMatcher, RequestDetails, RequestMatcher};
use std::collections::{BTreeMap, HashMap};

/// Outcome of evaluating one rule against one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleEvaluation {
    /// Number of constrained fields that matched. Query, header and state
    /// constraints count once per key.
    pub score: usize,
    /// Names of the constrained fields that did not match, in evaluation order.
    pub missed_fields: Vec<String>,
    /// Every `requiresState` entry is present in the state with an equal value.
    pub state_satisfied: bool,
    /// Every field a fingerprint can see (everything but headers and state)
    /// matched.
    pub fingerprint_fields_matched: bool,
}

impl RuleEvaluation {
    /// The rule matches when its state precondition holds and no field missed.
    pub fn is_match(&self) -> bool {
        self.state_satisfied && self.missed_fields.is_empty()
    }
}

/// Evaluate every constrained field of `matcher`.
///
/// In standalone-server deployment (`webserver`) the destination matcher is
/// skipped, since the host is not part of the request identity there.
pub fn evaluate_rule(
    matcher: &RequestMatcher,
    request: &RequestDetails,
    state: &HashMap<String, String>,
    webserver: bool,
) -> RuleEvaluation {
    let mut eval = RuleEvaluation::default();

    let mut scalar = |name: &str, field: &Option<Vec<FieldMatcher>>, value: &str| {
        if let Some(matchers) = constrained(field) {
            if matches_all(matchers, value) {
                eval.score += 1;
            } else {
                eval.missed_fields.push(name.to_string());
            }
        }
    };
    scalar("path", &matcher.path, &request.path);
    scalar("method", &matcher.method, &request.method);
    if !webserver {
        scalar("destination", &matcher.destination, &request.destination);
    }
    scalar("scheme", &matcher.scheme, &request.scheme);
    scalar("body", &matcher.body, &request.body);

    keyed(&mut eval, "query", &matcher.query, |k| request.query_value(k));
    eval.fingerprint_fields_matched = eval.missed_fields.is_empty();
    keyed(&mut eval, "headers", &matcher.headers, |k| request.header_value(k));

    eval.state_satisfied = true;
    for (key, required) in matcher.required_state() {
        if state.get(key) == Some(required) {
            eval.score += 1;
        } else {
            eval.state_satisfied = false;
        }
    }

    eval
}

fn keyed(
    eval: &mut RuleEvaluation,
    prefix: &str,
    field: &Option<BTreeMap<String, Vec<FieldMatcher>>>,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let Some(entries) = constrained_map(field) else {
        return;
    };
    for (key, matchers) in entries {
        let matched = lookup(key).is_some_and(|value| matches_all(matchers, &value));
        if matched {
            eval.score += 1;
        } else {
            eval.missed_fields.push(format!("{prefix}.{key}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(path: &str) -> RequestDetails {
        RequestDetails::new("GET", "http", "api.example.com", path, Some("page=1&tag=b&tag=a"))
            .with_header("X-Api-Key", "secret")
    }

    #[test]
    fn test_wildcard_rule_matches_with_zero_score() {
        let eval = evaluate_rule(&RequestMatcher::default(), &get("/x"), &HashMap::new(), false);
        assert!(eval.is_match());
        assert_eq!(eval.score, 0);
    }

    #[test]
    fn test_score_counts_keys() {
        let matcher = RequestMatcher::default()
            .with_path(FieldMatcher::exact("/x"))
            .with_query("page", FieldMatcher::exact("1"))
            .with_query("tag", FieldMatcher::exact("a;b"))
            .with_header("x-api-key", FieldMatcher::exact("secret"));
        let eval = evaluate_rule(&matcher, &get("/x"), &HashMap::new(), false);
        assert!(eval.is_match());
        assert_eq!(eval.score, 4);
    }

    #[test]
    fn test_missed_fields_are_named() {
        let matcher = RequestMatcher::default()
            .with_method(FieldMatcher::exact("POST"))
            .with_query("missing", FieldMatcher::exact("1"))
            .with_header("X-Api-Key", FieldMatcher::exact("other"));
        let eval = evaluate_rule(&matcher, &get("/x"), &HashMap::new(), false);
        assert!(!eval.is_match());
        assert_eq!(
            eval.missed_fields,
            vec!["method", "query.missing", "headers.X-Api-Key"]
        );
        assert!(!eval.fingerprint_fields_matched);
    }

    #[test]
    fn test_header_miss_keeps_fingerprint_fields_matched() {
        let matcher = RequestMatcher::default()
            .with_path(FieldMatcher::exact("/x"))
            .with_header("X-Api-Key", FieldMatcher::exact("other"));
        let eval = evaluate_rule(&matcher, &get("/x"), &HashMap::new(), false);
        assert!(!eval.is_match());
        assert!(eval.fingerprint_fields_matched);
    }

    #[test]
    fn test_required_state_is_exact_subset() {
        let matcher = RequestMatcher::default().with_required_state("eggs", "present");
        let mut state = HashMap::new();
        assert!(!evaluate_rule(&matcher, &get("/x"), &state, false).state_satisfied);

        state.insert("eggs".to_string(), "absent".to_string());
        assert!(!evaluate_rule(&matcher, &get("/x"), &state, false).state_satisfied);

        state.insert("eggs".to_string(), "present".to_string());
        state.insert("other".to_string(), "x".to_string());
        let eval = evaluate_rule(&matcher, &get("/x"), &state, false);
        assert!(eval.is_match());
        assert_eq!(eval.score, 1);
    }

    #[test]
    fn test_destination_skipped_in_webserver_mode() {
        let matcher = RequestMatcher::default().with_destination(FieldMatcher::exact("other.com"));
        assert!(!evaluate_rule(&matcher, &get("/x"), &HashMap::new(), false).is_match());
        assert!(evaluate_rule(&matcher, &get("/x"), &HashMap::new(), true).is_match());
    }
}
