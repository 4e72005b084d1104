//! Handler for `apiquery`
//!
//! Long-lived service state shared by every request: the compiler, the
//! executor and a few counters. Each call builds its own `ResolutionContext`,
//! so concurrent requests share nothing but the executor's connection pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};

use super::error::RequestError;
use crate::compiler::{QueryCompiler, SqlCompiler};
use crate::executor::{QueryExecutor, SqliteExecutor};
use crate::resolve::resolve_request;
use crate::response::ResponseBody;
use crate::Config;

pub struct Handler {
    compiler: Arc<dyn QueryCompiler>,
    executor: Arc<dyn QueryExecutor>,
    start_time: Instant,
    request_count: AtomicU64,
    failure_count: AtomicU64,
}

impl Handler {
    /// Create a handler over explicit collaborators.
    pub fn new(compiler: Arc<dyn QueryCompiler>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            compiler,
            executor,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
        }
    }

    /// Create a handler with the SQL compiler and a SQLite executor.
    pub fn from_config(config: &Config) -> Result<Self, String> {
        let executor = SqliteExecutor::open(&config.database)
            .map_err(|e| format!("Failed to open database: {e}"))?;
        Ok(Self::new(Arc::new(SqlCompiler::new()), Arc::new(executor)))
    }

    /// Get uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Requests resolved so far.
    pub fn total_requests(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Requests whose response carried a failure code.
    pub fn failed_requests(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Resolve one decoded request.
    pub fn handle(&self, request: &Map<String, Value>) -> ResponseBody {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        let body = resolve_request(request, self.compiler.as_ref(), self.executor.as_ref());
        if !body.is_success() {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }
        body
    }

    /// Decode a raw body, resolve it and encode the response.
    ///
    /// Returns the status to send (mirroring the response `code`) and the
    /// encoded body.
    pub fn handle_bytes(&self, raw: &[u8]) -> Result<(u16, Vec<u8>), RequestError> {
        let request = match serde_json::from_slice::<Value>(raw)? {
            Value::Object(map) => map,
            _ => return Err(RequestError::NotAnObject),
        };

        let body = self.handle(&request);
        let encoded =
            serde_json::to_vec(&body).map_err(|e| RequestError::Encoding(e.to_string()))?;
        tracing::debug!(code = body.code, bytes = encoded.len(), "response ready");
        Ok((body.code, encoded))
    }
}
