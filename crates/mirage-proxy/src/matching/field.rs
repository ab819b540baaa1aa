//! Field matcher evaluators.
//!
//! Each matcher kind is a pure function of the matcher value and the request
//! value. Chained matchers (`doMatch`) run after their parent matches: on the
//! extracted value for `jsonpath`/`xpath`, on the same input otherwise.

use super::json::json_partial_match;
use super::xml::{extract_xpath, xml_partial_match};
use crate::models::{
    decode_component, ArrayConfig, FieldMatcher, MatcherKind, MatcherValue, VALUE_SEPARATOR,
};
use serde_json_path::JsonPath;
use std::collections::BTreeMap;
use tracing::trace;

/// Every matcher in the list must match the value.
pub fn matches_all(matchers: &[FieldMatcher], value: &str) -> bool {
    matchers.iter().all(|m| field_matches(m, value))
}

/// Evaluate one matcher (and its chain) against a value.
pub fn field_matches(matcher: &FieldMatcher, value: &str) -> bool {
    let (matched, extracted) = evaluate(matcher, value);
    trace!(kind = %matcher.kind, matched, "field matcher evaluated");
    if !matched {
        return false;
    }
    match &matcher.do_match {
        Some(next) => field_matches(next, extracted.as_deref().unwrap_or(value)),
        None => true,
    }
}

/// Returns whether the matcher matched and, for extracting kinds, the value
/// handed to a chained matcher.
fn evaluate(matcher: &FieldMatcher, value: &str) -> (bool, Option<String>) {
    match (&matcher.kind, &matcher.value) {
        (MatcherKind::Exact, MatcherValue::Scalar(expected)) => (expected == value, None),
        (MatcherKind::Negate, MatcherValue::Scalar(expected)) => (expected != value, None),
        (MatcherKind::Glob, MatcherValue::Scalar(pattern)) => (glob_matches(pattern, value), None),
        (MatcherKind::Regex, MatcherValue::Scalar(_)) => (matcher.regex_matches(value), None),
        (MatcherKind::Json, MatcherValue::Scalar(expected)) => {
            (json_partial_match(expected, value), None)
        }
        (MatcherKind::Xml, MatcherValue::Scalar(expected)) => {
            (xml_partial_match(expected, value), None)
        }
        (MatcherKind::JsonPath, MatcherValue::Scalar(expr)) => match extract_json_path(value, expr) {
            Some(found) => (true, Some(found)),
            None => (false, None),
        },
        (MatcherKind::XPath, MatcherValue::Scalar(expr)) => match extract_xpath(value, expr) {
            Some(found) => (true, Some(found)),
            None => (false, None),
        },
        (MatcherKind::Array, MatcherValue::List(expected)) => (
            array_matches(
                expected,
                matcher.config.unwrap_or_default(),
                &split_values(value),
            ),
            None,
        ),
        (MatcherKind::Form, MatcherValue::NestedFields(fields)) => {
            (form_matches(fields, value), None)
        }
        _ => (false, None),
    }
}

fn glob_matches(pattern: &str, value: &str) -> bool {
    glob::Pattern::new(pattern).is_ok_and(|p| p.matches(value))
}

/// Evaluate an RFC 9535 JSONPath expression. Returns the first selected node
/// (strings unquoted) or `None` when nothing is selected.
pub fn extract_json_path(body: &str, expr: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let path = JsonPath::parse(expr).ok()?;
    let node = path.query(&json).all().into_iter().next()?;
    Some(match node {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Values presented to the array matcher: a JSON array if the value parses as
/// one, otherwise the separator-joined list used for query and header values.
fn split_values(value: &str) -> Vec<String> {
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(value) {
        return items
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
    }
    if value.is_empty() {
        return Vec::new();
    }
    value.split(VALUE_SEPARATOR).map(str::to_string).collect()
}

fn array_matches(expected: &[String], config: ArrayConfig, actual: &[String]) -> bool {
    if !config.ignore_unknown && actual.iter().any(|a| !expected.contains(a)) {
        return false;
    }
    if expected.iter().any(|e| !actual.contains(e)) {
        return false;
    }

    let count = |list: &[String], item: &String| list.iter().filter(|v| *v == item).count();
    if !config.ignore_occurrences
        && expected
            .iter()
            .any(|e| count(actual, e) != count(expected, e))
    {
        return false;
    }

    if !config.ignore_order {
        let known: Vec<&String> = actual.iter().filter(|a| expected.contains(a)).collect();
        let expected: Vec<&String> = expected.iter().collect();
        if config.ignore_occurrences {
            return first_occurrences(&known) == first_occurrences(&expected);
        }
        return known == expected;
    }

    true
}

fn first_occurrences<'a>(items: &[&'a String]) -> Vec<&'a String> {
    let mut seen: Vec<&String> = Vec::new();
    for item in items {
        if !seen.contains(item) {
            seen.push(item);
        }
    }
    seen
}

fn form_matches(fields: &BTreeMap<String, Vec<FieldMatcher>>, value: &str) -> bool {
    let mut form: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for pair in value.split('&').filter(|p| !p.is_empty()) {
        let (key, val) = pair.split_once('=').unwrap_or((pair, ""));
        form.entry(decode_component(key))
            .or_default()
            .push(decode_component(val));
    }

    fields.iter().all(|(name, matchers)| match form.get(name) {
        Some(values) => matches_all(matchers, &values.join(VALUE_SEPARATOR)),
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_negate() {
        assert!(field_matches(&FieldMatcher::exact("/a"), "/a"));
        assert!(!field_matches(&FieldMatcher::exact("/a"), "/A"));
        assert!(field_matches(&FieldMatcher::negate("/a"), "/b"));
        assert!(!field_matches(&FieldMatcher::negate("/a"), "/a"));
    }

    #[test]
    fn test_glob() {
        let m = FieldMatcher::glob("/api/*/items");
        assert!(field_matches(&m, "/api/v1/items"));
        assert!(field_matches(&m, "/api/v1/nested/items"));
        assert!(!field_matches(&m, "/api/v1/other"));
        assert!(field_matches(&FieldMatcher::glob("*.example.com"), "api.example.com"));
    }

    #[test]
    fn test_regex() {
        let m = FieldMatcher::regex(r"^/api/v\d+/");
        assert!(field_matches(&m, "/api/v1/users"));
        assert!(!field_matches(&m, "/api/users"));
        assert!(!field_matches(&FieldMatcher::regex("(unclosed"), "anything"));
    }

    #[test]
    fn test_json_and_xml() {
        assert!(field_matches(
            &FieldMatcher::json(r#"{"a": 1}"#),
            r#"{"b": 2, "a": 1}"#
        ));
        assert!(field_matches(
            &FieldMatcher::xml("<a><b>1</b></a>"),
            "<a> <c/> <b>1</b> </a>"
        ));
    }

    #[test]
    fn test_json_path_chained() {
        let body = r#"{"user": {"id": 7, "name": "eve"}}"#;
        assert!(field_matches(&FieldMatcher::json_path("$.user.name"), body));
        assert!(!field_matches(&FieldMatcher::json_path("$.user.missing"), body));

        let chained = FieldMatcher::json_path("$.user.id").then(FieldMatcher::exact("7"));
        assert!(field_matches(&chained, body));
        let chained = FieldMatcher::json_path("$.user.name").then(FieldMatcher::glob("e*"));
        assert!(field_matches(&chained, body));
        let chained = FieldMatcher::json_path("$.user.name").then(FieldMatcher::exact("bob"));
        assert!(!field_matches(&chained, body));
    }

    #[test]
    fn test_xpath_chained() {
        let body = "<order><id>42</id></order>";
        assert!(field_matches(&FieldMatcher::xpath("/order/id"), body));
        let chained = FieldMatcher::xpath("/order/id").then(FieldMatcher::regex(r"^\d+$"));
        assert!(field_matches(&chained, body));
        assert!(!field_matches(&FieldMatcher::xpath("/order/missing"), body));
    }

    #[test]
    fn test_chain_on_same_input() {
        let m = FieldMatcher::glob("/api/*").then(FieldMatcher::regex("users$"));
        assert!(field_matches(&m, "/api/users"));
        assert!(!field_matches(&m, "/api/orders"));
    }

    #[test]
    fn test_array_default_config() {
        let m = FieldMatcher::array(["a", "b"]);
        assert!(field_matches(&m, "b;a"));
        assert!(field_matches(&m, r#"["a", "b"]"#));
        assert!(!field_matches(&m, "a"));
        assert!(!field_matches(&m, "a;b;c"));
        assert!(!field_matches(&m, "a;b;b"));
    }

    #[test]
    fn test_array_config() {
        let lenient = FieldMatcher::array(["a"]).with_config(ArrayConfig {
            ignore_unknown: true,
            ignore_order: true,
            ignore_occurrences: true,
        });
        assert!(field_matches(&lenient, "x;a;a"));

        let ordered = FieldMatcher::array(["a", "b"]).with_config(ArrayConfig {
            ignore_unknown: false,
            ignore_order: false,
            ignore_occurrences: false,
        });
        assert!(field_matches(&ordered, "a;b"));
        assert!(!field_matches(&ordered, "b;a"));
    }

    #[test]
    fn test_form_matcher() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "grant_type".to_string(),
            vec![FieldMatcher::exact("password")],
        );
        fields.insert(
            "payload".to_string(),
            vec![FieldMatcher::json_path("$.id").then(FieldMatcher::exact("3"))],
        );
        let m = FieldMatcher::form(fields);

        let body = "grant_type=password&payload=%7B%22id%22%3A3%7D&extra=1";
        assert!(field_matches(&m, body));
        assert!(!field_matches(&m, "grant_type=password"));
        assert!(!field_matches(&m, "grant_type=client&payload=%7B%22id%22%3A3%7D"));
    }

    #[test]
    fn test_matches_all_requires_every_matcher() {
        let matchers = vec![FieldMatcher::glob("/api/*"), FieldMatcher::negate("/api/admin")];
        assert!(matches_all(&matchers, "/api/users"));
        assert!(!matches_all(&matchers, "/api/admin"));
        assert!(matches_all(&[], "anything"));
    }

    #[test]
    fn test_regex_compiled_on_the_matcher() {
        let matcher = FieldMatcher::regex("^x+$");
        assert!(!matcher.compiled.is_compiled());
        assert!(field_matches(&matcher, "xxx"));
        assert!(matcher.compiled.is_compiled());

        let copy = matcher.clone();
        assert!(copy.compiled.is_compiled());
        assert!(!field_matches(&copy, "xy"));
        assert_eq!(copy, FieldMatcher::regex("^x+$"));
    }
}
