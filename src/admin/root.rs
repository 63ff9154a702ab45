//! Site-root editing.

use crate::admin::error::ApiError;
use crate::admin::AdminState;
use crate::server::registry::Registry;
use axum::extract::{Form, Path, State};
use http::StatusCode;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct RootForm {
    #[serde(default)]
    root: String,
}

/// PUT /:addr/root: change a site's root directory.
///
/// The stack is rebuilt under the registry lock so middleware that captured
/// the old root (notably extension search) picks up the new one atomically:
/// requests observe either the fully-old or the fully-new stack.
pub async fn set(
    State(state): State<AdminState>,
    Path(addr): Path<String>,
    Form(form): Form<RootForm>,
) -> Result<StatusCode, ApiError> {
    if form.root.is_empty() {
        return Err(ApiError::bad_request("root cannot be empty"));
    }

    let (host, port) = state.split_addr(&addr);
    let servers = state.engine.registry().lock().await;
    let (_, vhost) = Registry::find(&servers, &host, port).ok_or_else(ApiError::not_found)?;

    vhost.set_root(PathBuf::from(&form.root));
    vhost.build_stack().map_err(ApiError::internal)?;
    Ok(StatusCode::OK)
}
