//! Request Resolution
//!
//! One [`ResolutionContext`] is built per request. It owns every piece of
//! per-request state and is passed by `&mut` through compilation, so no state
//! is shared between requests and nothing is global.
//!
//! ## Key lifecycle
//!
//! ```text
//! Unresolved --resolve--> InProgress --+--> Completed
//!                                      +--> Failed
//! ```
//!
//! A key is `InProgress` exactly while it sits on the active resolution
//! stack, so meeting an `InProgress` key again is a cycle. `Completed` and
//! `Failed` are terminal; a key's compile+execute work runs at most once per
//! request.
//!
//! ## Failure
//!
//! The first failure is recorded and terminates the request. Failures that
//! arrive afterwards (typically the same error propagating up through the
//! keys that referenced the failing one) are ignored.

mod loader;

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use crate::compiler::{CompileError, QueryCompiler};
use crate::error::{ResolveError, ResolveResult, SpecProblem};
use crate::executor::QueryExecutor;
use crate::response::{ResponseBody, RESERVED_KEYS};

/// Resolution state of one request key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Unresolved,
    InProgress,
    Completed,
    Failed,
}

/// Per-request resolution state.
pub struct ResolutionContext<'a> {
    request: &'a Map<String, Value>,
    compiler: &'a dyn QueryCompiler,
    executor: &'a dyn QueryExecutor,
    results: Map<String, Value>,
    states: HashMap<String, KeyState>,
    timings: BTreeMap<String, Duration>,
    /// Time spent in nested resolutions, one slot per key on the stack.
    nested: Vec<Duration>,
    /// First recorded failure. `Some` means the request is terminated.
    failure: Option<ResolveError>,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(
        request: &'a Map<String, Value>,
        compiler: &'a dyn QueryCompiler,
        executor: &'a dyn QueryExecutor,
    ) -> Self {
        tracing::debug!(keys = request.len(), "new resolution context");
        Self {
            request,
            compiler,
            executor,
            results: Map::new(),
            states: HashMap::with_capacity(request.len()),
            timings: BTreeMap::new(),
            nested: Vec::new(),
            failure: None,
        }
    }

    pub fn state(&self, key: &str) -> KeyState {
        self.states
            .get(key)
            .copied()
            .unwrap_or(KeyState::Unresolved)
    }

    pub fn is_terminated(&self) -> bool {
        self.failure.is_some()
    }

    /// The failure that terminated the request, if any.
    pub fn failure(&self) -> Option<&ResolveError> {
        self.failure.as_ref()
    }

    /// Resolved value of a completed key.
    pub fn result(&self, key: &str) -> Option<&Value> {
        self.results.get(key)
    }

    /// Exclusive compile+execute time per key that reached a terminal state.
    pub fn timings(&self) -> &BTreeMap<String, Duration> {
        &self.timings
    }

    /// Resolve one key, reusing its stored value if it already completed.
    pub fn resolve(&mut self, key: &str) -> ResolveResult<Value> {
        match self.state(key) {
            KeyState::Completed => {
                return Ok(self.results.get(key).cloned().unwrap_or(Value::Null));
            }
            KeyState::Failed => return Err(ResolveError::Terminated),
            KeyState::InProgress => {
                return Err(self.reject(ResolveError::CyclicReference {
                    reference: key.to_string(),
                }));
            }
            KeyState::Unresolved => {}
        }
        if self.is_terminated() {
            return Err(ResolveError::Terminated);
        }

        tracing::debug!(key, "resolving");
        self.states.insert(key.to_string(), KeyState::InProgress);
        self.nested.push(Duration::ZERO);
        let started = Instant::now();

        let outcome = self.compile_and_run(key);

        let elapsed = started.elapsed();
        let nested = self.nested.pop().unwrap_or_default();
        if let Some(parent) = self.nested.last_mut() {
            *parent += elapsed;
        }
        let own = elapsed.saturating_sub(nested);
        self.timings.insert(key.to_string(), own);

        match outcome {
            Ok(value) => {
                tracing::debug!(key, elapsed_ns = own.as_nanos() as u64, "resolved");
                self.states.insert(key.to_string(), KeyState::Completed);
                self.results.insert(key.to_string(), value.clone());
                Ok(value)
            }
            Err(err) => {
                self.states.insert(key.to_string(), KeyState::Failed);
                Err(self.reject(err))
            }
        }
    }

    fn compile_and_run(&mut self, key: &str) -> ResolveResult<Value> {
        let request = self.request;
        let spec = field_spec(key, request.get(key))?;

        let compiler = self.compiler;
        let query = compiler
            .compile(key, spec, self)
            .map_err(|e| match e {
                CompileError::Reference(inner) => inner,
                other => ResolveError::Compilation {
                    key: key.to_string(),
                    message: other.to_string(),
                },
            })?;
        // A compiler may swallow a reference error and still return a query.
        if self.is_terminated() {
            return Err(ResolveError::Terminated);
        }
        tracing::debug!(key, statement = %query.statement, params = ?query.params, "executing");

        self.executor
            .run(&query)
            .map_err(|e| ResolveError::Execution {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    /// Record a failure and terminate the request. Only the first failure is
    /// kept.
    pub fn fail(&mut self, error: ResolveError) {
        if let Some(first) = &self.failure {
            tracing::debug!(%error, first = %first, "request already terminated");
            return;
        }
        if error == ResolveError::Terminated {
            return;
        }
        tracing::error!(code = error.status(), msg = %error, "terminating request");
        self.failure = Some(error);
    }

    fn reject(&mut self, error: ResolveError) -> ResolveError {
        self.fail(error.clone());
        error
    }

    /// Resolve every request key in request order and assemble the response.
    ///
    /// Stops at the first failure; keys resolved before it stay in the
    /// response, keys not yet attempted are absent.
    pub fn into_response(mut self) -> ResponseBody {
        let started = Instant::now();
        let request = self.request;

        // Shape errors win over everything else and leave no partial results.
        if let Some(error) = request
            .iter()
            .find_map(|(key, value)| field_spec(key, Some(value)).err())
        {
            self.fail(error);
        }

        for key in request.keys() {
            if self.is_terminated() {
                break;
            }
            if self.state(key) == KeyState::Unresolved {
                // The outcome lands in the context; the failure flag decides
                // whether to continue.
                let _ = self.resolve(key);
            }
        }

        match self.failure.take() {
            Some(error) => ResponseBody::failure(self.results, &error),
            None => ResponseBody::success(self.results, started.elapsed(), &self.timings),
        }
    }
}

/// Check that a key's raw value is a usable field specification.
fn field_spec<'r>(key: &str, raw: Option<&'r Value>) -> ResolveResult<&'r Map<String, Value>> {
    let invalid = |problem| ResolveError::InvalidKeySpec {
        key: key.to_string(),
        problem,
    };
    if RESERVED_KEYS.contains(&key) {
        return Err(invalid(SpecProblem::Reserved));
    }
    match raw {
        None | Some(Value::Null) => Err(invalid(SpecProblem::Empty)),
        Some(Value::Object(spec)) => Ok(spec),
        Some(_) => Err(invalid(SpecProblem::NotObject)),
    }
}

/// Resolve one request end to end.
pub fn resolve_request(
    request: &Map<String, Value>,
    compiler: &dyn QueryCompiler,
    executor: &dyn QueryExecutor,
) -> ResponseBody {
    ResolutionContext::new(request, compiler, executor).into_response()
}

#[cfg(test)]
mod tests;
