//! SQLite executor.

use std::fs;
use std::path::Path;
use std::time::Duration;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags, Row};
use serde_json::{Map, Number, Value};

use super::{ExecuteResult, Pool, QueryExecutor};
use crate::config::DatabaseConfig;

/// Executes statements on a pooled set of SQLite connections.
pub struct SqliteExecutor {
    pool: Pool<Connection>,
    acquire_timeout: Option<Duration>,
}

impl SqliteExecutor {
    /// Open the database described by `config`.
    ///
    /// Runs the configured init script first, then opens one pooled
    /// connection eagerly so a bad path fails at startup instead of on the
    /// first request.
    pub fn open(config: &DatabaseConfig) -> ExecuteResult<Self> {
        if let Some(script) = &config.init_script {
            run_init_script(&config.path, script)?;
        }

        let path = config.path.clone();
        let read_only = config.read_only;
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let pool = Pool::new(config.pool_size, move || {
            open_connection(&path, read_only, busy_timeout)
        });

        let acquire_timeout = (config.acquire_timeout_ms > 0)
            .then(|| Duration::from_millis(config.acquire_timeout_ms));

        let executor = SqliteExecutor {
            pool,
            acquire_timeout,
        };
        drop(executor.pool.acquire(executor.acquire_timeout)?);

        tracing::info!(
            path = %config.path.display(),
            pool_size = config.pool_size,
            read_only,
            "SQLite executor ready"
        );
        Ok(executor)
    }

    /// Connections currently open.
    pub fn open_connections(&self) -> usize {
        self.pool.open_count()
    }
}

fn run_init_script(db_path: &Path, script: &Path) -> ExecuteResult<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let sql = fs::read_to_string(script)?;
    let conn = Connection::open(db_path)?;
    conn.execute_batch(&sql)?;
    tracing::info!(script = %script.display(), "ran database init script");
    Ok(())
}

fn open_connection(
    path: &Path,
    read_only: bool,
    busy_timeout: Duration,
) -> ExecuteResult<Connection> {
    let access = if read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
    };
    let flags = access | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI;

    let conn = Connection::open_with_flags(path, flags)?;
    conn.busy_timeout(busy_timeout)?;
    if read_only {
        conn.pragma_update(None, "query_only", 1)?;
    }
    Ok(conn)
}

impl QueryExecutor for SqliteExecutor {
    fn run_one(&self, statement: &str, params: &[Value]) -> ExecuteResult<Value> {
        let conn = self.pool.acquire(self.acquire_timeout)?;
        let mut stmt = conn.prepare_cached(statement)?;
        let columns = column_names(&stmt);
        let mut rows = stmt.query(params_from_iter(params.iter().map(to_sql_value)))?;
        let record = match rows.next()? {
            Some(row) => row_to_json(row, &columns)?,
            None => Value::Null,
        };
        Ok(record)
    }

    fn run_all(&self, statement: &str, params: &[Value]) -> ExecuteResult<Vec<Value>> {
        let conn = self.pool.acquire(self.acquire_timeout)?;
        let mut stmt = conn.prepare_cached(statement)?;
        let columns = column_names(&stmt);
        let mut rows = stmt.query(params_from_iter(params.iter().map(to_sql_value)))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_json(row, &columns)?);
        }
        Ok(records)
    }
}

fn column_names(stmt: &rusqlite::Statement<'_>) -> Vec<String> {
    stmt.column_names().into_iter().map(str::to_string).collect()
}

/// JSON parameter -> SQLite value. Booleans bind as 0/1, nested structures
/// as their JSON text.
fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn row_to_json(row: &Row<'_>, columns: &[String]) -> ExecuteResult<Value> {
    let mut record = Map::with_capacity(columns.len());
    for (i, name) in columns.iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::from(i),
            ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
            ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::from(b.to_vec()),
        };
        record.insert(name.clone(), value);
    }
    Ok(Value::Object(record))
}
