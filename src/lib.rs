//! # apiquery
//!
//! Resolves a JSON object of named queries into one aggregated JSON response.
//! Each top-level key is a query; its field specification may reference
//! the result of a sibling key by path, so keys resolve lazily and in
//! dependency order.
//!
//! ## Pipeline
//!
//! ```text
//! {"User": {"id": 1}, "Moment": {"userId@": "/User/id"}}
//!     ↓
//! [ResolutionContext]  → per-request key states, memoized results, timings
//!     ↓
//! [QueryCompiler]      → parameterized statement (references loaded on demand)
//!     ↓
//! [QueryExecutor]      → one row or all rows as JSON
//!     ↓
//! [ResponseBody]       → {"User": {...}, "Moment": {...}, "code": 200, "time": "..."}
//! ```
//!
//! Failures are first-error-wins: the first cycle, missing reference,
//! compile or execute error stops the request and becomes `code`/`msg`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use apiquery::{resolve_request, Config, SqlCompiler, SqliteExecutor};
//!
//! let config = Config::load()?;
//! let executor = SqliteExecutor::open(&config.database)?;
//! let request = serde_json::from_str(r#"{"User": {"id": 1}}"#)?;
//! let body = resolve_request(&request, &SqlCompiler::new(), &executor);
//! println!("{}", serde_json::to_string(&body)?);
//! ```

pub mod compiler;
pub mod config;
pub mod error;
pub mod executor;
pub mod protocol;
pub mod reference;
pub mod resolve;
pub mod response;

pub use compiler::{CompileError, CompiledQuery, FetchMode, QueryCompiler, ReferenceLoader, SqlCompiler};
pub use config::Config;
pub use error::{ResolveError, ResolveResult, SpecProblem};
pub use executor::{ExecuteError, ExecuteResult, QueryExecutor, SqliteExecutor};
pub use reference::ReferencePath;
pub use resolve::{resolve_request, KeyState, ResolutionContext};
pub use response::ResponseBody;
