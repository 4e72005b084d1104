//! Query Handler
//!
//! `POST /get`: the body is a JSON object of named queries. Resolution runs
//! on the blocking pool since the executor talks to SQLite synchronously.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::rejection::BytesRejection,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use uuid::Uuid;

use crate::protocol::{Handler, RequestError};

pub async fn get(
    Extension(handler): Extension<Arc<Handler>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return RequestError::MalformedBody(rejection.body_text()).into_response(),
    };

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("request", %request_id, bytes = body.len());

    let outcome = tokio::task::spawn_blocking(move || {
        let _enter = span.enter();
        handler.handle_bytes(&body)
    })
    .await;

    match outcome {
        Ok(Ok((code, encoded))) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, [(header::CONTENT_TYPE, "application/json")], encoded).into_response()
        }
        Ok(Err(e)) => e.into_response(),
        Err(e) => RequestError::Internal(format!("resolution task failed: {e}")).into_response(),
    }
}
