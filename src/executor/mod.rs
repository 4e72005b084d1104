//! Query Execution
//!
//! Runs compiled statements against the backend:
//! - `QueryExecutor` trait: the interface the resolution engine depends on
//! - `SqliteExecutor`: rusqlite over a bounded connection pool
//!
//! Executors are shared by every in-flight request, so implementations must be
//! safe for concurrent independent use. A single request never issues two
//! statements at once.

mod pool;
mod sqlite;

pub use pool::{Pool, Pooled};
pub use sqlite::SqliteExecutor;

use std::time::Duration;

use serde_json::Value;

use crate::compiler::{CompiledQuery, FetchMode};

/// Execution error types
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    /// SQLite rejected or failed the statement
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No connection became free in time
    #[error("timed out after {0:?} waiting for a database connection")]
    PoolTimeout(Duration),

    /// I/O error (reading the init script, creating the data directory)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for execution operations
pub type ExecuteResult<T> = Result<T, ExecuteError>;

/// Runs compiled statements.
pub trait QueryExecutor: Send + Sync {
    /// Run a statement expected to produce one record. `Value::Null` when no
    /// row matches.
    fn run_one(&self, statement: &str, params: &[Value]) -> ExecuteResult<Value>;

    /// Run a statement and collect every record.
    fn run_all(&self, statement: &str, params: &[Value]) -> ExecuteResult<Vec<Value>>;

    /// Dispatch on the query's fetch mode.
    fn run(&self, query: &CompiledQuery) -> ExecuteResult<Value> {
        match query.fetch {
            FetchMode::One => self.run_one(&query.statement, &query.params),
            FetchMode::All => self
                .run_all(&query.statement, &query.params)
                .map(Value::Array),
        }
    }
}
