use super::*;
use crate::compiler::{CompiledQuery, FetchMode, ReferenceLoader};
use crate::executor::{ExecuteError, ExecuteResult};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

/// Compiles a key into a statement named after the key. Every field ending
/// in `@` is loaded through the callback and becomes a parameter.
struct EchoCompiler;

impl QueryCompiler for EchoCompiler {
    fn compile(
        &self,
        key: &str,
        spec: &Map<String, Value>,
        loader: &mut dyn ReferenceLoader,
    ) -> Result<CompiledQuery, CompileError> {
        if spec.contains_key("invalid") {
            return Err(CompileError::UnknownDirective("invalid".to_string()));
        }
        let mut params = Vec::new();
        for (field, value) in spec {
            if field.ends_with('@') {
                let reference = value.as_str().unwrap_or_default();
                params.push(loader.load(reference)?);
            }
        }
        Ok(CompiledQuery {
            statement: key.to_string(),
            params,
            fetch: if key.ends_with("[]") {
                FetchMode::All
            } else {
                FetchMode::One
            },
        })
    }
}

/// Compiler that ignores reference failures and compiles anyway.
struct CarelessCompiler;

impl QueryCompiler for CarelessCompiler {
    fn compile(
        &self,
        key: &str,
        spec: &Map<String, Value>,
        loader: &mut dyn ReferenceLoader,
    ) -> Result<CompiledQuery, CompileError> {
        for value in spec.values() {
            if let Some(reference) = value.as_str() {
                let _ = loader.load(reference);
            }
        }
        Ok(CompiledQuery {
            statement: key.to_string(),
            params: Vec::new(),
            fetch: FetchMode::One,
        })
    }
}

/// Returns canned rows per statement and records every call.
#[derive(Default)]
struct CannedExecutor {
    rows: HashMap<String, Value>,
    failing: Vec<String>,
    delay: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl CannedExecutor {
    fn with(rows: &[(&str, Value)]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn answer(&self, statement: &str, params: &[Value]) -> ExecuteResult<Value> {
        self.calls.lock().push(statement.to_string());
        if let Some(delay) = self.delay.get(statement) {
            std::thread::sleep(*delay);
        }
        if self.failing.iter().any(|s| s == statement) {
            return Err(ExecuteError::Sqlite(rusqlite::Error::InvalidQuery));
        }
        Ok(self
            .rows
            .get(statement)
            .cloned()
            .unwrap_or_else(|| json!({ "params": params })))
    }
}

impl QueryExecutor for CannedExecutor {
    fn run_one(&self, statement: &str, params: &[Value]) -> ExecuteResult<Value> {
        self.answer(statement, params)
    }

    fn run_all(&self, statement: &str, params: &[Value]) -> ExecuteResult<Vec<Value>> {
        match self.answer(statement, params)? {
            Value::Array(rows) => Ok(rows),
            other => Ok(vec![other]),
        }
    }
}

fn request(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("request must be an object, got {other}"),
    }
}

fn run(req: &Map<String, Value>, exec: &CannedExecutor) -> Value {
    let body = resolve_request(req, &EchoCompiler, exec);
    serde_json::to_value(&body).unwrap()
}

#[test]
fn test_all_valid_keys_resolve() {
    let req = request(json!({"A": {}, "B[]": {}}));
    let exec = CannedExecutor::with(&[("A", json!({"id": 1})), ("B[]", json!([{"id": 2}, {"id": 3}]))]);

    let resp = run(&req, &exec);
    assert_eq!(resp["code"], json!(200));
    assert_eq!(resp["A"], json!({"id": 1}));
    assert_eq!(resp["B[]"], json!([{"id": 2}, {"id": 3}]));
    assert!(resp["time"].as_str().unwrap().contains("ms|"));
    assert!(resp.get("msg").is_none());
}

#[test]
fn test_empty_request_succeeds() {
    let req = request(json!({}));
    let resp = run(&req, &CannedExecutor::default());
    assert_eq!(resp["code"], json!(200));
    assert_eq!(resp["time"].as_str().unwrap().split('|').nth(1), Some("{}"));
}

#[test]
fn test_null_key_yields_only_code_and_msg() {
    let req = request(json!({"A": {}, "B": null, "C": {}}));
    let exec = CannedExecutor::with(&[("A", json!({"id": 1}))]);

    let resp = run(&req, &exec);
    assert_eq!(resp, json!({"code": 400, "msg": "empty value, key: B"}));
    assert!(exec.calls().is_empty());
}

#[test]
fn test_non_object_key_rejected() {
    let req = request(json!({"A": {}, "B": [1, 2]}));
    let resp = run(&req, &CannedExecutor::default());
    assert_eq!(
        resp,
        json!({"code": 400, "msg": "wrong type, object required, key: B"})
    );
}

#[test]
fn test_reserved_key_rejected() {
    let req = request(json!({"code": {}}));
    let resp = run(&req, &CannedExecutor::default());
    assert_eq!(resp["code"], json!(400));
    assert_eq!(resp["msg"], json!("reserved name, key: code"));
}

#[test]
fn test_reference_resolves_nested_field() {
    let req = request(json!({"A": {}, "B": {"x@": "/A/x"}}));
    let exec = CannedExecutor::with(&[("A", json!({"x": 5}))]);

    let resp = run(&req, &exec);
    assert_eq!(resp["code"], json!(200));
    assert_eq!(resp["A"], json!({"x": 5}));
    assert_eq!(resp["B"], json!({"params": [5]}));
}

#[test]
fn test_reference_without_leading_separator() {
    let req = request(json!({"A": {}, "B": {"x@": "A/x"}}));
    let exec = CannedExecutor::with(&[("A", json!({"x": "five"}))]);
    let resp = run(&req, &exec);
    assert_eq!(resp["B"], json!({"params": ["five"]}));
}

#[test]
fn test_whole_record_reference() {
    let req = request(json!({"A": {}, "B": {"a@": "/A"}}));
    let exec = CannedExecutor::with(&[("A", json!({"x": 1, "y": 2}))]);
    let resp = run(&req, &exec);
    assert_eq!(resp["B"], json!({"params": [{"x": 1, "y": 2}]}));
}

#[test]
fn test_forward_reference_resolves_lazily() {
    let req = request(json!({"B": {"x@": "/A/x"}, "A": {}}));
    let exec = CannedExecutor::with(&[("A", json!({"x": 7}))]);

    let resp = run(&req, &exec);
    assert_eq!(resp["code"], json!(200));
    assert_eq!(resp["B"], json!({"params": [7]}));
    assert_eq!(exec.calls(), vec!["A".to_string(), "B".to_string()]);
}

#[test]
fn test_each_key_executes_once() {
    let req = request(json!({
        "A": {},
        "B": {"x@": "/A/x"},
        "C": {"x@": "/A/x", "b@": "/B/params"},
    }));
    let exec = CannedExecutor::with(&[("A", json!({"x": 1}))]);

    let resp = run(&req, &exec);
    assert_eq!(resp["code"], json!(200));
    assert_eq!(
        exec.calls(),
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    );
}

#[test]
fn test_direct_resolve_is_memoized() {
    let req = request(json!({"A": {}}));
    let exec = CannedExecutor::with(&[("A", json!({"x": 1}))]);
    let mut ctx = ResolutionContext::new(&req, &EchoCompiler, &exec);

    let first = ctx.resolve("A").unwrap();
    let second = ctx.resolve("A").unwrap();
    let via_ref = ctx.load("/A/x").unwrap();

    assert_eq!(first, second);
    assert_eq!(via_ref, json!(1));
    assert_eq!(ctx.state("A"), KeyState::Completed);
    assert_eq!(exec.calls().len(), 1);
}

#[test]
fn test_missing_field_is_unresolved_reference() {
    let req = request(json!({"A": {}, "B": {"x@": "/A/B"}}));
    let exec = CannedExecutor::with(&[("A", json!({"x": 5}))]);

    let resp = run(&req, &exec);
    assert_eq!(resp["code"], json!(400));
    assert_eq!(
        resp["msg"],
        json!("reference not found at /A/B, reference: /A/B")
    );
}

#[test]
fn test_null_field_is_unresolved_reference() {
    let req = request(json!({"A": {}, "B": {"x@": "/A/x/deep"}}));
    let exec = CannedExecutor::with(&[("A", json!({"x": null}))]);

    let resp = run(&req, &exec);
    assert_eq!(resp["code"], json!(400));
    assert_eq!(
        resp["msg"],
        json!("reference not found at /A/x, reference: /A/x/deep")
    );
}

#[test]
fn test_reference_into_list_is_unresolved() {
    let req = request(json!({"A[]": {}, "B": {"x@": "/A[]/id"}}));
    let exec = CannedExecutor::with(&[("A[]", json!([{"id": 1}]))]);

    let resp = run(&req, &exec);
    assert_eq!(resp["code"], json!(400));
    assert!(resp["msg"].as_str().unwrap().contains("/A[]/id"));
}

#[test]
fn test_empty_single_row_is_unresolved() {
    let req = request(json!({"A": {}, "B": {"x@": "/A"}}));
    let exec = CannedExecutor::with(&[("A", Value::Null)]);

    let resp = run(&req, &exec);
    assert_eq!(resp["code"], json!(400));
    assert_eq!(resp["msg"], json!("reference not found at /A, reference: /A"));
}

#[test]
fn test_malformed_reference_rejected() {
    let req = request(json!({"B": {"x@": "/"}}));
    let resp = run(&req, &CannedExecutor::default());
    assert_eq!(resp["code"], json!(400));
}

#[test]
fn test_reference_to_absent_key() {
    let req = request(json!({"B": {"x@": "/Nope/id"}}));
    let resp = run(&req, &CannedExecutor::default());
    assert_eq!(resp, json!({"code": 400, "msg": "empty value, key: Nope"}));
}

#[test]
fn test_cycle_detected_and_later_key_not_resolved() {
    let req = request(json!({
        "A": {"b@": "/B/id"},
        "B": {"a@": "/A/id"},
        "C": {},
    }));
    let exec = CannedExecutor::default();

    let resp = run(&req, &exec);
    assert_eq!(resp["code"], json!(400));
    assert_eq!(resp["msg"], json!("cyclic reference, reference: /A/id"));
    assert!(resp.get("C").is_none());
    assert!(exec.calls().is_empty());
}

#[test]
fn test_self_reference_is_cycle() {
    let req = request(json!({"A": {"a@": "/A/id"}}));
    let resp = run(&req, &CannedExecutor::default());
    assert_eq!(resp["code"], json!(400));
    assert!(resp["msg"].as_str().unwrap().starts_with("cyclic reference"));
}

#[test]
fn test_cycle_marks_chain_failed() {
    let req = request(json!({"A": {"b@": "/B/id"}, "B": {"a@": "/A/id"}}));
    let exec = CannedExecutor::default();
    let mut ctx = ResolutionContext::new(&req, &EchoCompiler, &exec);

    assert!(ctx.resolve("A").is_err());
    assert_eq!(ctx.state("A"), KeyState::Failed);
    assert_eq!(ctx.state("B"), KeyState::Failed);
    assert!(matches!(
        ctx.failure(),
        Some(ResolveError::CyclicReference { .. })
    ));
    // Failed keys are terminal
    assert_eq!(ctx.resolve("A"), Err(ResolveError::Terminated));
}

#[test]
fn test_execution_failure_keeps_earlier_results() {
    let req = request(json!({"A": {}, "B": {}, "C": {}}));
    let mut exec = CannedExecutor::with(&[("A", json!({"id": 1}))]);
    exec.failing.push("B".to_string());

    let resp = run(&req, &exec);
    assert_eq!(resp["code"], json!(500));
    assert_eq!(resp["A"], json!({"id": 1}));
    assert!(resp.get("B").is_none());
    assert!(resp.get("C").is_none());
    assert!(resp.get("time").is_none());
    assert_eq!(exec.calls(), vec!["A".to_string(), "B".to_string()]);
}

#[test]
fn test_compile_error_is_bad_request() {
    let req = request(json!({"A": {"invalid": true}}));
    let resp = run(&req, &CannedExecutor::default());
    assert_eq!(resp, json!({"code": 400, "msg": "unknown directive 'invalid'"}));
}

#[test]
fn test_first_error_wins_through_nested_failures() {
    // C -> B -> A, and A fails to execute. B and C fail on the way out but the
    // reported error stays A's.
    let req = request(json!({"C": {"b@": "/B/x"}, "B": {"a@": "/A/x"}, "A": {}}));
    let mut exec = CannedExecutor::default();
    exec.failing.push("A".to_string());

    let resp = run(&req, &exec);
    assert_eq!(resp["code"], json!(500));
    assert_eq!(resp["msg"], json!(ExecuteError::Sqlite(rusqlite::Error::InvalidQuery).to_string()));
}

#[test]
fn test_fail_keeps_first_error() {
    let req = request(json!({}));
    let exec = CannedExecutor::default();
    let mut ctx = ResolutionContext::new(&req, &EchoCompiler, &exec);

    let first = ResolveError::CyclicReference {
        reference: "/A".to_string(),
    };
    ctx.fail(first.clone());
    ctx.fail(ResolveError::Execution {
        key: "B".to_string(),
        message: "later".to_string(),
    });
    assert!(ctx.is_terminated());
    assert_eq!(ctx.failure(), Some(&first));
}

#[test]
fn test_terminated_context_refuses_work() {
    let req = request(json!({"A": {}}));
    let exec = CannedExecutor::default();
    let mut ctx = ResolutionContext::new(&req, &EchoCompiler, &exec);
    ctx.fail(ResolveError::CyclicReference {
        reference: "/X".to_string(),
    });

    assert_eq!(ctx.resolve("A"), Err(ResolveError::Terminated));
    assert_eq!(ctx.load("/A"), Err(ResolveError::Terminated));
    assert!(exec.calls().is_empty());
}

#[test]
fn test_swallowed_reference_error_still_stops_execution() {
    let req = request(json!({"A": {"r": "/Missing"}, "B": {}}));
    let exec = CannedExecutor::default();

    let body = resolve_request(&req, &CarelessCompiler, &exec);
    assert_eq!(body.code, 400);
    assert_eq!(body.msg.as_deref(), Some("empty value, key: Missing"));
    assert!(exec.calls().is_empty());
}

#[test]
fn test_timing_recorded_for_terminal_keys() {
    let req = request(json!({"A": {}, "B": {"x@": "/A/x"}}));
    let exec = CannedExecutor::with(&[("A", json!({"x": 1}))]);
    let mut ctx = ResolutionContext::new(&req, &EchoCompiler, &exec);

    ctx.resolve("B").unwrap();
    assert!(ctx.timings().contains_key("A"));
    assert!(ctx.timings().contains_key("B"));
}

#[test]
fn test_reference_wait_charged_to_referenced_key() {
    let req = request(json!({"B": {"x@": "/A/x"}, "A": {}}));
    let mut exec = CannedExecutor::with(&[("A", json!({"x": 1}))]);
    exec.delay.insert("A".to_string(), Duration::from_millis(30));
    let mut ctx = ResolutionContext::new(&req, &EchoCompiler, &exec);

    let started = Instant::now();
    ctx.resolve("B").unwrap();
    let total = started.elapsed();

    let a = ctx.timings()["A"];
    let b = ctx.timings()["B"];
    assert!(a >= Duration::from_millis(30));
    assert!(b < Duration::from_millis(30));
    assert!(total >= a + b);
}

#[test]
fn test_total_time_covers_per_key_sum() {
    let req = request(json!({"A": {}, "B": {}}));
    let mut exec = CannedExecutor::default();
    exec.delay.insert("A".to_string(), Duration::from_millis(2));
    exec.delay.insert("B".to_string(), Duration::from_millis(2));

    let resp = run(&req, &exec);
    let time = resp["time"].as_str().unwrap();
    let (total, per_key) = time.split_once('|').unwrap();
    let total_ms: u128 = total.trim_end_matches("ms").parse().unwrap();
    let per_key: Map<String, Value> = serde_json::from_str(per_key).unwrap();
    let sum_ns: u128 = per_key.values().map(|v| u128::from(v.as_u64().unwrap())).sum();

    assert_eq!(per_key.len(), 2);
    assert!(total_ms * 1_000_000 >= sum_ns);
}
