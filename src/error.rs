//! Error types for request resolution.

/// HTTP-style status codes carried in the response `code` field.
pub mod status {
    pub const OK: u16 = 200;
    pub const BAD_REQUEST: u16 = 400;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
}

/// Why a key's raw field specification was rejected before compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecProblem {
    /// Absent or `null`
    Empty,
    /// Present but not a JSON object
    NotObject,
    /// Collides with a response metadata field
    Reserved,
}

impl std::fmt::Display for SpecProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecProblem::Empty => write!(f, "empty value"),
            SpecProblem::NotObject => write!(f, "wrong type, object required"),
            SpecProblem::Reserved => write!(f, "reserved name"),
        }
    }
}

/// Failure while resolving one request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// A top-level key's value is null, not an object, or uses a reserved name
    #[error("{problem}, key: {key}")]
    InvalidKeySpec { key: String, problem: SpecProblem },

    /// A reference names a key that is still being resolved
    #[error("cyclic reference, reference: {reference}")]
    CyclicReference { reference: String },

    /// A reference walked into an absent or null value
    #[error("reference not found at {path}, reference: {reference}")]
    UnresolvedReference { reference: String, path: String },

    /// The compiler rejected a key's field specification
    #[error("{message}")]
    Compilation { key: String, message: String },

    /// The executor failed to run a compiled statement
    #[error("{message}")]
    Execution { key: String, message: String },

    /// An earlier failure already terminated the request
    #[error("request terminated by an earlier failure")]
    Terminated,
}

impl ResolveError {
    /// Status code reported for this failure.
    pub fn status(&self) -> u16 {
        match self {
            ResolveError::Execution { .. } | ResolveError::Terminated => {
                status::INTERNAL_SERVER_ERROR
            }
            _ => status::BAD_REQUEST,
        }
    }
}

/// Result type for resolution operations
pub type ResolveResult<T> = Result<T, ResolveError>;
