//! Diff mode: live responses compared against the simulation.

mod common;

use common::{engine_with, get, CountingDelayer, StubForwarder};
use mirage_proxy::diff::DiffEntry;
use mirage_proxy::models::ResponseDetails;

const SIMULATION: &str = r#"[
  {
    "requestMatcher": {"path": [{"matcher": "exact", "value": "/user"}]},
    "response": {
      "status": 200,
      "body": "{\"foo\": \"bar\", \"id\": 1}",
      "headers": {"Content-Type": ["application/json"]},
      "transitionsState": {"seen": "yes"}
    }
  }
]"#;

fn live(body: &str) -> ResponseDetails {
    ResponseDetails::new(200, body).with_header("Content-Type", "application/json")
}

#[tokio::test]
async fn test_diff_records_differences_and_returns_live() {
    let forwarder = StubForwarder::new(vec![live(r#"{"foo": "baz", "id": 1}"#)]);
    let delayer = CountingDelayer::new();
    let engine = engine_with(forwarder.clone(), delayer.clone());
    engine.import_simulation(SIMULATION).unwrap();
    engine.set_mode("diff", None).unwrap();

    let response = engine.process(get("/user")).await;
    assert_eq!(response.body, r#"{"foo": "baz", "id": 1}"#);
    assert_eq!(forwarder.calls(), 1);

    let diffs = engine.diffs();
    assert_eq!(diffs.len(), 1);
    let (key, reports) = diffs.iter().next().unwrap();
    assert_eq!(key.path, "/user");
    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0].diff_entries,
        vec![DiffEntry::new("body/foo", "bar", "baz")]
    );

    // Read-only: no state effects, no delay, nothing cached.
    assert!(engine.state().is_empty());
    assert_eq!(delayer.count(), 0);
    assert_eq!(engine.cache_metrics().size, 0);

    engine.clear_diffs();
    assert!(engine.diffs().is_empty());
}

#[tokio::test]
async fn test_identical_response_records_nothing() {
    let forwarder = StubForwarder::new(vec![live(r#"{"id": 1, "foo": "bar"}"#)]);
    let engine = engine_with(forwarder, CountingDelayer::new());
    engine.import_simulation(SIMULATION).unwrap();
    engine.set_mode("diff", None).unwrap();

    engine.process(get("/user")).await;
    assert!(engine.diffs().is_empty());
}

#[tokio::test]
async fn test_unmatched_request_returns_live() {
    let forwarder = StubForwarder::body("live only");
    let engine = engine_with(forwarder, CountingDelayer::new());
    engine.import_simulation(SIMULATION).unwrap();
    engine.set_mode("diff", None).unwrap();

    let response = engine.process(get("/unknown")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "live only");
    assert!(engine.diffs().is_empty());
}

#[tokio::test]
async fn test_reports_accumulate_per_request() {
    let forwarder = StubForwarder::new(vec![
        live(r#"{"foo": "baz", "id": 1}"#),
        live(r#"{"foo": "bar", "id": 2}"#),
    ]);
    let engine = engine_with(forwarder, CountingDelayer::new());
    engine.import_simulation(SIMULATION).unwrap();
    engine.set_mode("diff", None).unwrap();

    engine.process(get("/user")).await;
    engine.process(get("/user")).await;
    let diffs = engine.diffs();
    let reports = diffs.values().next().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[1].diff_entries, vec![DiffEntry::new("body/id", "1", "2")]);
}
