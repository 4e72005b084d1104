//! Query Compilation
//!
//! Turns one key's field specification into a backend statement.
//!
//! The compiler never talks to the resolution engine directly. It receives a
//! [`ReferenceLoader`] capability and calls it whenever the specification
//! embeds a reference string; the loader may recursively resolve other keys
//! before returning.
//!
//! ```text
//! ResolutionContext::resolve("B")
//!     -> QueryCompiler::compile("B", spec, loader)
//!          -> loader.load("/A/id")          (resolves "A" on demand)
//!     -> QueryExecutor::run_one / run_all
//! ```

mod sql;

pub use sql::SqlCompiler;

use serde_json::{Map, Value};

use crate::error::{ResolveError, ResolveResult};

/// Callback handed to a compiler for resolving embedded references.
pub trait ReferenceLoader {
    /// Resolve a reference string such as `"/User/id"` to its value.
    fn load(&mut self, reference: &str) -> ResolveResult<Value>;
}

/// Whether the statement should produce a single record or a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Exactly one record (or `null` when nothing matches)
    One,
    /// Every matching record
    All,
}

/// A compiled statement with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub statement: String,
    pub params: Vec<Value>,
    pub fetch: FetchMode,
}

/// Compilation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileError {
    /// An embedded reference could not be resolved
    #[error(transparent)]
    Reference(#[from] ResolveError),

    /// The request key does not name a queryable target
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// A table or column name is not a plain identifier
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    /// An `@` directive the compiler does not understand
    #[error("unknown directive '{0}'")]
    UnknownDirective(String),

    /// A condition or directive value has the wrong shape
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Compiles field specifications into statements.
pub trait QueryCompiler: Send + Sync {
    fn compile(
        &self,
        key: &str,
        spec: &Map<String, Value>,
        loader: &mut dyn ReferenceLoader,
    ) -> Result<CompiledQuery, CompileError>;
}
