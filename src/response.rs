//! Response Assembly
//!
//! Folds per-key outcomes into the payload returned to the client:
//!
//! ```text
//! success: { <key>: <value>, ..., "code": 200, "time": "<N>ms|{<key>: <ns>, ...}" }
//! failure: { <keys resolved before the failure>, "code": 4xx|5xx, "msg": "..." }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{status, ResolveError};

/// Metadata fields; request keys may not use these names.
pub const RESERVED_KEYS: [&str; 3] = ["code", "msg", "time"];

/// Final response for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseBody {
    /// Resolved keys, in resolution order
    #[serde(flatten)]
    pub results: Map<String, Value>,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl ResponseBody {
    pub fn success(
        results: Map<String, Value>,
        total: Duration,
        timings: &BTreeMap<String, Duration>,
    ) -> Self {
        Self {
            results,
            code: status::OK,
            msg: None,
            time: Some(format_time(total, timings)),
        }
    }

    /// Results stored before the failure stay in the body.
    pub fn failure(results: Map<String, Value>, error: &ResolveError) -> Self {
        Self {
            results,
            code: error.status(),
            msg: Some(error.to_string()),
            time: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == status::OK
    }
}

/// `"<total-ms>ms|<per-key nanoseconds>"`
///
/// The total is rounded up so it never reads below the per-key sum.
pub fn format_time(total: Duration, timings: &BTreeMap<String, Duration>) -> String {
    let per_key: Map<String, Value> = timings
        .iter()
        .map(|(key, elapsed)| (key.clone(), Value::from(elapsed.as_nanos() as u64)))
        .collect();
    let total_ms = total.as_nanos().div_ceil(1_000_000);
    format!("{total_ms}ms|{}", Value::Object(per_key))
}
