use super::*;
use crate::classify::Role;
use crate::turn::Turn;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory transcripts keyed by id, with optional failing ids.
struct FakeSource {
    ids: Vec<String>,
    logs: HashMap<String, Vec<serde_json::Value>>,
    failing: Vec<String>,
    list_status: Option<u16>,
    fetched: Mutex<Vec<String>>,
}

impl FakeSource {
    fn new() -> Self {
        Self {
            ids: Vec::new(),
            logs: HashMap::new(),
            failing: Vec::new(),
            list_status: None,
            fetched: Mutex::new(Vec::new()),
        }
    }

    fn with(mut self, id: &str, log: Vec<serde_json::Value>) -> Self {
        self.ids.push(id.to_string());
        self.logs.insert(id.to_string(), log);
        self
    }

    fn failing(mut self, id: &str) -> Self {
        self.ids.push(id.to_string());
        self.failing.push(id.to_string());
        self
    }
}

impl TranscriptSource for FakeSource {
    fn list_transcript_ids(&self, _project: &str, _range: &DateRange) -> Result<Vec<String>, ApiError> {
        if let Some(status) = self.list_status {
            return Err(ApiError::Status {
                url: "fake://list".into(),
                status,
            });
        }
        Ok(self.ids.clone())
    }

    fn transcript_turns(&self, _project: &str, id: &str) -> Result<Vec<Turn>, ApiError> {
        self.fetched.lock().unwrap().push(id.to_string());
        if self.failing.iter().any(|f| f == id) {
            return Err(ApiError::Status {
                url: format!("fake://{id}"),
                status: 500,
            });
        }
        let (turns, _) = Turn::parse_all(self.logs.get(id).cloned().unwrap_or_default());
        Ok(turns)
    }
}

fn request(query: &str) -> serde_json::Value {
    json!({ "type": "request", "payload": { "payload": { "query": query } } })
}

fn text(message: &str) -> serde_json::Value {
    json!({ "type": "text", "payload": { "payload": { "message": message } } })
}

fn debug(message: &str) -> serde_json::Value {
    json!({ "type": "debug", "payload": { "payload": { "type": "code", "message": message } } })
}

fn run(source: &FakeSource, categories: &[String], workers: usize) -> Result<Harvest, ApiError> {
    let filter = DebugFilter::default();
    let settings = RunSettings {
        project_id: "proj",
        range: DateRange::parse("2024-07-14", "2024-08-07").unwrap(),
        categories,
        filter: &filter,
        workers,
    };
    harvest(source, &settings)
}

fn cats(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn end_to_end_scenario() {
    let filter = DebugFilter {
        debug_markers: vec!["Tags:".into()],
        debug_payload_type: None,
    };
    let source = FakeSource::new().with(
        "t1",
        vec![request("Hi"), text("Hello!"), debug("Tags: \"Greeting\"")],
    );
    let categories = cats(&["Greeting", "Billing"]);
    let settings = RunSettings {
        project_id: "proj",
        range: DateRange::parse("2024-07-14", "2024-08-07").unwrap(),
        categories: &categories,
        filter: &filter,
        workers: 2,
    };
    let harvest = harvest(&source, &settings).unwrap();

    assert_eq!(harvest.transcripts.len(), 1);
    let roles: Vec<Role> = harvest.transcripts[0].messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::Human, Role::Bot, Role::Debug]);
    assert_eq!(harvest.human_count, 1);
    let pairs: Vec<(&str, u64)> = harvest.tally.iter().collect();
    assert_eq!(pairs, vec![("Greeting", 1), ("Billing", 0)]);
}

#[test]
fn merges_many_transcripts_across_workers() {
    let mut source = FakeSource::new();
    for i in 0..40 {
        let tag = if i % 2 == 0 { "Billing" } else { "Shipping" };
        source = source.with(
            &format!("t{i:02}"),
            vec![
                request("q1"),
                request("q2"),
                text("a"),
                debug(&format!("CategoryFilter [\"{tag}\"]")),
            ],
        );
    }
    let categories = cats(&["Shipping", "Billing", "Returns"]);

    for workers in [1, 3, 8, 64] {
        let harvest = run(&source, &categories, workers).unwrap();
        assert_eq!(harvest.human_count, 80, "workers={workers}");
        let pairs: Vec<(&str, u64)> = harvest.tally.iter().collect();
        assert_eq!(pairs, vec![("Shipping", 20), ("Billing", 20), ("Returns", 0)]);
        let ids: Vec<&str> = harvest.transcripts.iter().map(|t| t.id.as_str()).collect();
        let expected: Vec<String> = (0..40).map(|i| format!("t{i:02}")).collect();
        assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }
}

#[test]
fn empty_listing_yields_empty_harvest() {
    let source = FakeSource::new();
    let harvest = run(&source, &cats(&["A"]), 4).unwrap();
    assert!(harvest.transcripts.is_empty());
    assert_eq!(harvest.human_count, 0);
    assert_eq!(harvest.tally.get("A"), Some(0));
}

#[test]
fn listing_failure_is_fatal() {
    let mut source = FakeSource::new().with("t1", vec![request("Hi")]);
    source.list_status = Some(403);
    let err = run(&source, &cats(&["A"]), 2).unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 403, .. }));
    assert!(source.fetched.lock().unwrap().is_empty());
}

#[test]
fn fetch_failure_is_fatal_and_stops_a_single_worker() {
    let source = FakeSource::new()
        .with("t1", vec![request("Hi")])
        .failing("t2")
        .with("t3", vec![request("Hello")])
        .with("t4", vec![request("Hey")]);
    let err = run(&source, &cats(&["A"]), 1).unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 500, .. }));
    assert_eq!(*source.fetched.lock().unwrap(), vec!["t1", "t2"]);
}

#[test]
fn fetch_failure_is_fatal_with_many_workers() {
    let mut source = FakeSource::new();
    for i in 0..20 {
        source = source.with(&format!("ok{i}"), vec![request("Hi")]);
    }
    source = source.failing("bad");
    let err = run(&source, &cats(&["A"]), 4).unwrap_err();
    assert!(err.to_string().contains("HTTP 500"));
}

#[test]
fn malformed_turns_do_not_fail_the_run() {
    let source = FakeSource::new().with(
        "t1",
        vec![
            json!({ "type": "request", "payload": "garbage" }),
            json!({ "type": "request", "payload": { "payload": null } }),
            request("real"),
        ],
    );
    let harvest = run(&source, &cats(&[]), 1).unwrap();
    assert_eq!(harvest.human_count, 1);
    assert!(harvest.tally.is_empty());
}
