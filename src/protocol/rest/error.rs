//! REST API Error Types
//!
//! Transport failures answer with the mapped status and an empty body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::protocol::RequestError;

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match status {
            s if s.is_server_error() => tracing::error!(error = %self, "request failed"),
            _ => tracing::warn!(error = %self, "request rejected"),
        }
        status.into_response()
    }
}
