//! Transport-level error types.
//!
//! These cover failures around a request rather than inside it: the body
//! could not be read or decoded, or the computed response could not be
//! encoded. Failures inside resolution are reported in the response body
//! instead (see `ResolveError`).

use crate::error::status;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// Body could not be read or is not valid JSON
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    /// Body is valid JSON but not an object
    #[error("request body must be a JSON object")]
    NotAnObject,

    /// The response could not be serialized
    #[error("failed to encode response: {0}")]
    Encoding(String),

    /// Anything else that prevented the request from completing
    #[error("internal error: {0}")]
    Internal(String),
}

impl RequestError {
    pub fn status(&self) -> u16 {
        match self {
            RequestError::MalformedBody(_) | RequestError::NotAnObject => status::BAD_REQUEST,
            RequestError::Encoding(_) | RequestError::Internal(_) => {
                status::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(e: serde_json::Error) -> Self {
        RequestError::MalformedBody(e.to_string())
    }
}
