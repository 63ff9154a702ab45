//! The admin API: every live-reconfiguration operation, over HTTP.
//!
//! | Method | Path | Meaning |
//! |---|---|---|
//! | GET | `/` | list all servers |
//! | POST | `/` | create servers from config text (`?replace=true` overwrites) |
//! | PUT | `/` | replace all servers, with health-checked rollback |
//! | GET | `/:addr` | one vhost's config |
//! | DELETE | `/:addr` | stop a vhost or its server |
//! | PUT | `/:addr/root` | change the site root |
//! | GET/POST/DELETE | `/:addr/ext` | manage the extensions middleware |
//! | POST | `/:addr/ext/extensions` | replace the extension list |
//! | PUT/DELETE | `/:addr/ext/extensions/:ext` | add/remove one extension |
//! | POST | `/:addr/tls` | enable or update TLS |
//! | POST | `/cmd/reload` | re-read the startup config and replace all |

pub mod auth;
pub mod error;
pub mod ext;
pub mod root;
pub mod servers;
pub mod tls;

use crate::lifecycle::Engine;
use axum::routing::{get, post, put};
use axum::{middleware, Router};
use axum_server::Handle;
use std::net::SocketAddr;
use std::path::PathBuf;

pub use error::ApiError;

/// State shared by every admin handler.
#[derive(Clone)]
pub struct AdminState {
    pub engine: Engine,
    /// The configuration file the process started from, for `/cmd/reload`.
    pub config_path: Option<PathBuf>,
    /// Bearer token; `None` leaves the admin API unauthenticated.
    pub api_key: Option<String>,
}

/// Build the admin router.
pub fn router(state: AdminState) -> Router {
    if state.api_key.is_none() {
        tracing::warn!("admin API running without authentication");
    }
    Router::new()
        .route("/", get(servers::list).post(servers::create).put(servers::replace))
        .route("/cmd/reload", post(servers::reload))
        .route("/{addr}", get(servers::info).delete(servers::stop))
        .route("/{addr}/root", put(root::set))
        .route("/{addr}/ext", get(ext::get).post(ext::create).delete(ext::delete))
        .route("/{addr}/ext/extensions", post(ext::set_list))
        .route("/{addr}/ext/extensions/{ext}", put(ext::add).delete(ext::remove))
        .route("/{addr}/tls", post(tls::enable))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_auth))
        .with_state(state)
}

/// Serve the admin API until the handle is shut down.
pub async fn serve(state: AdminState, addr: SocketAddr, handle: Handle) -> std::io::Result<()> {
    tracing::info!(address = %addr, "admin API listening");
    axum_server::bind(addr).handle(handle).serve(router(state).into_make_service()).await
}
