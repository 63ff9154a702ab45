//! Bearer-token authentication for the admin API.

use crate::admin::error::ApiError;
use crate::admin::AdminState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::header;

/// Rejects requests whose Authorization header does not carry the
/// configured API key. With no key configured the admin API is open; the
/// operator is warned once at startup.
pub async fn require_auth(
    State(state): State<AdminState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(api_key) = &state.api_key else {
        return Ok(next.run(request).await);
    };

    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match header {
        Some(value) if value == format!("Bearer {api_key}") => Ok(next.run(request).await),
        _ => Err(ApiError::unauthorized()),
    }
}
