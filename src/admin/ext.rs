//! Extensions-middleware handlers: the middleware itself and its list.

use crate::admin::error::ApiError;
use crate::admin::AdminState;
use crate::config;
use crate::middleware::ext::{Ext, ExtInfo};
use crate::server::registry::Registry;
use crate::server::vhost::{InsertError, VirtualHost};
use axum::extract::{Path, State};
use axum::Json;
use http::StatusCode;
use std::sync::Arc;

/// Run `f` against the vhost's installed extensions middleware.
fn with_ext<T>(vhost: &Arc<VirtualHost>, f: impl FnOnce(&Ext) -> T) -> Result<T, ApiError> {
    let link = vhost.handler("ext").ok_or_else(ApiError::not_found)?;
    let ext = link
        .middleware()
        .as_any()
        .downcast_ref::<Ext>()
        .ok_or_else(|| ApiError::internal("handler installed for 'ext' has the wrong type"))?;
    Ok(f(ext))
}

/// GET /:addr/ext: the middleware's configuration.
pub async fn get(
    State(state): State<AdminState>,
    Path(addr): Path<String>,
) -> Result<Json<ExtInfo>, ApiError> {
    let (host, port) = state.split_addr(&addr);
    let servers = state.engine.registry().lock().await;
    let (_, vhost) = Registry::find(&servers, &host, port).ok_or_else(ApiError::not_found)?;
    with_ext(&vhost, |ext| Json(ext.info()))
}

/// POST /:addr/ext: install the middleware from its directive text.
pub async fn create(
    State(state): State<AdminState>,
    Path(addr): Path<String>,
    body: String,
) -> Result<StatusCode, ApiError> {
    let spec = config::parse_directive(&body).map_err(ApiError::bad_request)?;
    if spec.name != "ext" {
        return Err(ApiError::bad_request(format!("expected an 'ext' directive, got '{}'", spec.name)));
    }

    let (host, port) = state.split_addr(&addr);
    let servers = state.engine.registry().lock().await;
    let (_, vhost) = Registry::find(&servers, &host, port).ok_or_else(ApiError::not_found)?;

    match vhost.insert_middleware(spec) {
        Ok(()) => Ok(StatusCode::OK),
        Err(error @ InsertError::Exists(_)) => Err(ApiError::conflict(error)),
        Err(InsertError::Config(error)) => Err(ApiError::bad_request(error)),
    }
}

/// DELETE /:addr/ext: splice the middleware out of the chain.
pub async fn delete(
    State(state): State<AdminState>,
    Path(addr): Path<String>,
) -> Result<StatusCode, ApiError> {
    let (host, port) = state.split_addr(&addr);
    let servers = state.engine.registry().lock().await;
    let (_, vhost) = Registry::find(&servers, &host, port).ok_or_else(ApiError::not_found)?;

    if vhost.remove_middleware("ext") {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::not_found())
    }
}

/// POST /:addr/ext/extensions: replace the extension list.
pub async fn set_list(
    State(state): State<AdminState>,
    Path(addr): Path<String>,
    Json(extensions): Json<Vec<String>>,
) -> Result<StatusCode, ApiError> {
    let (host, port) = state.split_addr(&addr);
    let servers = state.engine.registry().lock().await;
    let (_, vhost) = Registry::find(&servers, &host, port).ok_or_else(ApiError::not_found)?;
    with_ext(&vhost, |ext| ext.set_extensions(extensions))?;
    Ok(StatusCode::OK)
}

/// PUT /:addr/ext/extensions/:ext: add one extension.
pub async fn add(
    State(state): State<AdminState>,
    Path((addr, extension)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let (host, port) = state.split_addr(&addr);
    let servers = state.engine.registry().lock().await;
    let (_, vhost) = Registry::find(&servers, &host, port).ok_or_else(ApiError::not_found)?;
    with_ext(&vhost, |ext| ext.add_extension(extension))?;
    Ok(StatusCode::OK)
}

/// DELETE /:addr/ext/extensions/:ext: remove one extension.
pub async fn remove(
    State(state): State<AdminState>,
    Path((addr, extension)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let (host, port) = state.split_addr(&addr);
    let servers = state.engine.registry().lock().await;
    let (_, vhost) = Registry::find(&servers, &host, port).ok_or_else(ApiError::not_found)?;
    with_ext(&vhost, |ext| ext.remove_extension(&extension))?;
    Ok(StatusCode::OK)
}
