//! The admin API's JSON error envelope.

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;

/// An error answered as `{"status":"error","code":...,"message":...}`.
/// Messages are suppressed on 5xx so internals never leak to clients.
#[derive(Debug)]
pub struct ApiError {
    code: StatusCode,
    message: Option<String>,
}

impl ApiError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self { code, message: Some(message.into()) }
    }

    pub fn not_found() -> Self {
        Self { code: StatusCode::NOT_FOUND, message: None }
    }

    pub fn unauthorized() -> Self {
        Self { code: StatusCode::UNAUTHORIZED, message: None }
    }

    pub fn bad_request(error: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error.to_string())
    }

    pub fn conflict(error: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::CONFLICT, error.to_string())
    }

    pub fn forbidden(error: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::FORBIDDEN, error.to_string())
    }

    pub fn internal(error: impl std::fmt::Display) -> Self {
        tracing::error!(%error, "admin request failed");
        Self { code: StatusCode::INTERNAL_SERVER_ERROR, message: None }
    }
}

impl From<crate::lifecycle::LifecycleError> for ApiError {
    fn from(error: crate::lifecycle::LifecycleError) -> Self {
        use crate::lifecycle::LifecycleError::*;
        match error {
            error @ (AlreadyListening { .. } | Config(_)) => Self::bad_request(error),
            error @ Hook { .. } => Self::internal(error),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorBody {
            status: &'static str,
            code: u16,
            #[serde(skip_serializing_if = "Option::is_none")]
            message: Option<String>,
        }

        let message = if self.code.is_server_error() { None } else { self.message };
        let body = ErrorBody { status: "error", code: self.code.as_u16(), message };
        (self.code, Json(body)).into_response()
    }
}
