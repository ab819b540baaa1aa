//! Structural comparison of an expected (simulated) and an actual (live)
//! response.

use super::decode::{decode_body, encoding_chain};
use crate::models::ResponseDetails;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::mem::discriminant;

/// Rendered in place of a value missing from the actual response.
pub const UNDEFINED: &str = "undefined";

/// One difference: the field path and both rendered values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub field: String,
    pub expected: String,
    pub actual: String,
}

impl DiffEntry {
    pub fn new(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Compare status, then headers, then body.
///
/// Headers are compared asymmetrically: only keys present in `expected` are
/// checked. Bodies are decoded through their `Content-Encoding` chain (raw
/// bytes on failure), compared structurally when both are JSON objects and as
/// whole strings otherwise.
pub fn diff(expected: &ResponseDetails, actual: &ResponseDetails) -> Vec<DiffEntry> {
    let mut entries = Vec::new();

    if expected.status != actual.status {
        entries.push(DiffEntry::new(
            "status",
            expected.status.to_string(),
            actual.status.to_string(),
        ));
    }

    diff_headers(expected, actual, &mut entries);

    let expected_body = decoded_body(expected);
    let actual_body = decoded_body(actual);
    match (
        serde_json::from_str::<Value>(&expected_body),
        serde_json::from_str::<Value>(&actual_body),
    ) {
        (Ok(Value::Object(e)), Ok(Value::Object(a))) => diff_objects("body", &e, &a, &mut entries),
        _ => {
            if expected_body != actual_body {
                entries.push(DiffEntry::new("body", expected_body, actual_body));
            }
        }
    }

    entries
}

fn diff_headers(expected: &ResponseDetails, actual: &ResponseDetails, entries: &mut Vec<DiffEntry>) {
    for (name, expected_values) in &expected.headers {
        let field = format!("header/{name}");
        match actual.header_values(name) {
            None => entries.push(DiffEntry::new(field, expected_values.join(";"), UNDEFINED)),
            Some(actual_values) if actual_values != expected_values.as_slice() => {
                entries.push(DiffEntry::new(
                    field,
                    expected_values.join(";"),
                    actual_values.join(";"),
                ));
            }
            Some(_) => {}
        }
    }
}

fn decoded_body(response: &ResponseDetails) -> String {
    let raw = response.body_bytes();
    let chain = response
        .header_values("content-encoding")
        .map(encoding_chain)
        .unwrap_or_default();
    let bytes = if chain.is_empty() {
        raw
    } else {
        decode_body(&raw, &chain).unwrap_or(raw)
    };
    String::from_utf8_lossy(&bytes).into_owned()
}

fn diff_objects(
    prefix: &str,
    expected: &Map<String, Value>,
    actual: &Map<String, Value>,
    entries: &mut Vec<DiffEntry>,
) {
    for (key, ev) in expected {
        let field = format!("{prefix}/{key}");
        match actual.get(key) {
            None => entries.push(DiffEntry::new(field, render(ev), UNDEFINED)),
            Some(av) if discriminant(ev) != discriminant(av) => {
                entries.push(DiffEntry::new(field, render(ev), render(av)));
            }
            Some(Value::Object(a)) => {
                if let Value::Object(e) = ev {
                    diff_objects(&field, e, a, entries);
                }
            }
            Some(av) => {
                if ev != av {
                    entries.push(DiffEntry::new(field, render(ev), render(av)));
                }
            }
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
