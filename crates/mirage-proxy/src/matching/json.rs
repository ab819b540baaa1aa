//! Structural JSON comparison with sub-tree semantics.

use serde_json::Value;

/// Parse both documents and check that every leaf specified by `expected` is
/// present and equal in `actual`. Key order and whitespace are irrelevant;
/// keys absent from `expected` are ignored.
pub fn json_partial_match(expected: &str, actual: &str) -> bool {
    let Ok(expected) = serde_json::from_str::<Value>(expected) else {
        return false;
    };
    let Ok(actual) = serde_json::from_str::<Value>(actual) else {
        return false;
    };
    json_contains(&actual, &expected)
}

/// Whether `actual` contains the structure described by `expected`.
///
/// Arrays are compared as collections: each expected element must be contained
/// by a distinct actual element.
pub fn json_contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(a), Value::Object(e)) => e
            .iter()
            .all(|(key, ev)| a.get(key).is_some_and(|av| json_contains(av, ev))),
        (Value::Array(a), Value::Array(e)) => {
            if e.len() > a.len() {
                return false;
            }
            let mut used = vec![false; a.len()];
            e.iter().all(|ev| {
                let found = a
                    .iter()
                    .enumerate()
                    .find(|(i, av)| !used[*i] && json_contains(av, ev))
                    .map(|(i, _)| i);
                match found {
                    Some(i) => {
                        used[i] = true;
                        true
                    }
                    None => false,
                }
            })
        }
        (Value::Number(a), Value::Number(e)) => match (a.as_f64(), e.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == e,
        },
        (a, e) => a == e,
    }
}
