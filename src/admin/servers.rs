//! Server collection handlers: list, inspect, create, replace, stop.

use crate::admin::error::ApiError;
use crate::admin::AdminState;
use crate::config::{self, SiteConfig};
use crate::server::registry::Registry;
use crate::server::ServerInfo;
use axum::extract::{Path, Query, State};
use axum::Json;
use http::StatusCode;
use serde::Deserialize;

/// GET /: every server with its virtual hosts, in registry order.
pub async fn list(State(state): State<AdminState>) -> Json<Vec<ServerInfo>> {
    let servers = state.engine.registry().lock().await;
    Json(servers.iter().map(|server| server.describe()).collect())
}

/// GET /:addr: one virtual host's configuration.
pub async fn info(
    State(state): State<AdminState>,
    Path(addr): Path<String>,
) -> Result<Json<SiteConfig>, ApiError> {
    let (host, port) = state.split_addr(&addr);
    let servers = state.engine.registry().lock().await;
    let (_, vhost) = Registry::find(&servers, &host, port).ok_or_else(ApiError::not_found)?;
    Ok(Json(vhost.config()))
}

#[derive(Debug, Deserialize)]
pub struct CreateQuery {
    #[serde(default)]
    pub replace: bool,
}

/// POST /?replace=: create servers from configuration text. Answers 201
/// when every new listener binds within the startup window, 202 otherwise.
/// A failure partway through a multi-binding request names the servers the
/// request did start; they stay registered and serving.
pub async fn create(
    State(state): State<AdminState>,
    Query(query): Query<CreateQuery>,
    body: String,
) -> Result<StatusCode, ApiError> {
    let new_servers = match state.engine.initialize_from_text(&body, query.replace).await {
        Ok(new_servers) => new_servers,
        Err(error) if error.started.is_empty() => return Err(error.source.into()),
        Err(error) => {
            // Partial result: earlier bindings are up; report them rather
            // than pretending nothing happened.
            state.engine.wait_listening(&error.started).await;
            let addresses: Vec<String> =
                error.started.iter().map(|server| server.address().to_string()).collect();
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                format!(
                    "{}; {} server(s) from this request started anyway: {}",
                    error.source,
                    addresses.len(),
                    addresses.join(", ")
                ),
            ));
        }
    };

    if state.engine.wait_listening(&new_servers).await {
        Ok(StatusCode::CREATED)
    } else {
        Ok(StatusCode::ACCEPTED)
    }
}

/// PUT /: replace every server with the submitted configuration. The work
/// (including health check and rollback) continues after the response;
/// inspect the registry to observe the outcome.
pub async fn replace(State(state): State<AdminState>, body: String) -> StatusCode {
    // Reject obviously empty input synchronously; everything else is
    // validated by the replace itself.
    if body.trim().is_empty() {
        return StatusCode::BAD_REQUEST;
    }
    tokio::spawn(async move {
        if let Err(error) = state.engine.replace_all(&body).await {
            tracing::error!(%error, "replace failed; previous configuration restored");
        }
    });
    StatusCode::ACCEPTED
}

/// DELETE /:addr: gracefully stop one virtual host, or its whole server
/// when it is the last one.
pub async fn stop(
    State(state): State<AdminState>,
    Path(addr): Path<String>,
) -> Result<StatusCode, ApiError> {
    let (host, port) = state.split_addr(&addr);
    match state.engine.stop_server(&host, port).await {
        Some(_) => Ok(StatusCode::ACCEPTED),
        None => Err(ApiError::not_found()),
    }
}

/// POST /cmd/reload: re-read the startup configuration file and replace
/// everything with it.
pub async fn reload(State(state): State<AdminState>) -> Result<StatusCode, ApiError> {
    let Some(path) = state.config_path.clone() else {
        return Err(ApiError::forbidden("no config file to reload"));
    };

    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|error| ApiError::internal(format!("read {}: {error}", path.display())))?;

    tokio::spawn(async move {
        if let Err(error) = state.engine.replace_all(&text).await {
            // The client is long gone by the time this can fail.
            tracing::error!(%error, "reload failed; previous configuration restored");
        }
    });
    Ok(StatusCode::ACCEPTED)
}

impl AdminState {
    /// Split an `:addr` route parameter, defaulting the port.
    pub(crate) fn split_addr(&self, addr: &str) -> (String, u16) {
        config::split_host_port(addr, self.engine.options().default_port)
    }
}
