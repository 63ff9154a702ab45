//! Runtime TLS enablement.

use crate::admin::error::ApiError;
use crate::admin::AdminState;
use crate::config::{self, loader};
use crate::lifecycle::health;
use crate::server::registry::Registry;
use axum::extract::{Path, State};
use http::StatusCode;
use std::sync::Arc;

/// POST /:addr/tls: enable (or update) TLS on a running server from a
/// `tls` directive in the body.
///
/// HTTP and HTTPS cannot share a port, so a plain server qualifies only if
/// the target is its single vhost. The server is then restarted as HTTPS in
/// the background: graceful stop, flip, re-register, start, and a singleton
/// health check that rolls back to a pre-change snapshot on failure.
pub async fn enable(
    State(state): State<AdminState>,
    Path(addr): Path<String>,
    body: String,
) -> Result<StatusCode, ApiError> {
    let spec = config::parse_directive(&body).map_err(ApiError::bad_request)?;
    if spec.name != "tls" {
        return Err(ApiError::bad_request(format!("expected a 'tls' directive, got '{}'", spec.name)));
    }

    let (host, port) = state.split_addr(&addr);
    let engine = state.engine.clone();

    let (server, backup) = {
        let servers = engine.registry().lock().await;
        let (server, vhost) =
            Registry::find(&servers, &host, port).ok_or_else(ApiError::not_found)?;

        if !server.tls() && server.vhost_count() > 1 {
            return Err(ApiError::bad_request("other hosts on the same socket are not HTTPS"));
        }

        let backup = server.snapshot().map_err(ApiError::internal)?;
        vhost.set_tls(loader::tls_from_args(&spec.args));
        (server, backup)
    };

    tokio::spawn(async move {
        let cutoff = engine.options().shutdown_cutoff;
        server.stop(cutoff);
        server.graceful().wait_stopped().await;
        server.set_tls(true);

        {
            let mut servers = engine.registry().lock().await;
            if !servers.iter().any(|other| Arc::ptr_eq(other, &server)) {
                servers.push(server.clone());
            }
            engine.start_server(server.clone());
        }

        health::check_and_restore(engine, server, backup);
    });

    Ok(StatusCode::ACCEPTED)
}
