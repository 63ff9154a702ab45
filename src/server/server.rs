//! One listener hosting one or more virtual hosts.
//!
//! # Responsibilities
//! - Multiplex requests onto virtual hosts by the Host header
//! - Fall back to the `0.0.0.0` wildcard host, then to 404
//! - Serve plain HTTP or TLS (combined SNI config over all hosts)
//! - Convert handler panics into 500s and give bodyless error responses a
//!   canonical status-text body

use crate::config::loader::split_host_port;
use crate::config::schema::SiteConfig;
use crate::server::graceful::Graceful;
use crate::server::tls;
use crate::server::vhost::{HookError, VirtualHost};
use axum::body::Body;
use axum::extract::State;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use http::{header, StatusCode};
use http_body::Body as _;
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tower_http::catch_panic::CatchPanicLayer;

/// Error starting or serving a server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tls(#[from] tls::TlsError),

    #[error("virtual host {host}: {source}")]
    Hook {
        host: String,
        #[source]
        source: HookError,
    },
}

/// JSON shape of one server in the admin listing.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub address: String,
    pub tls: bool,
    pub virtual_hosts: Vec<SiteConfig>,
}

pub struct Server {
    address: SocketAddr,
    tls: AtomicBool,
    /// Vhosts in insertion order; admin listings depend on it.
    vhosts: RwLock<Vec<(String, Arc<VirtualHost>)>>,
    graceful: Graceful,
    /// Bumped on every start; lets the self-removal of a finished serve task
    /// distinguish "this server exited" from "this server was restarted".
    epoch: AtomicU64,
}

impl Server {
    /// Build a server for `addr` from the sites that resolved to it. Does
    /// not bind or start anything. When one request names the same host
    /// twice, the later config wins.
    pub fn new(
        addr: SocketAddr,
        configs: Vec<SiteConfig>,
        tls: bool,
        drain_timeout: Duration,
    ) -> Result<Arc<Self>, crate::config::ConfigError> {
        let mut vhosts: Vec<(String, Arc<VirtualHost>)> = Vec::new();
        for config in configs {
            let host = config.host.clone();
            let vhost = VirtualHost::new(config)?;
            match vhosts.iter_mut().find(|(existing, _)| *existing == host) {
                Some(slot) => slot.1 = vhost,
                None => vhosts.push((host, vhost)),
            }
        }

        let server = Arc::new_cyclic(|weak: &Weak<Server>| {
            let graceful = Graceful::new(drain_timeout);
            let on_shutdown = weak.clone();
            graceful.on_shutdown(move || {
                if let Some(server) = on_shutdown.upgrade() {
                    for (_, vhost) in server.vhosts() {
                        vhost.stop();
                    }
                }
            });
            Self {
                address: addr,
                tls: AtomicBool::new(tls),
                vhosts: RwLock::new(vhosts),
                graceful,
                epoch: AtomicU64::new(0),
            }
        });
        Ok(server)
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn tls(&self) -> bool {
        self.tls.load(Ordering::SeqCst)
    }

    pub fn set_tls(&self, tls: bool) {
        self.tls.store(tls, Ordering::SeqCst);
    }

    pub fn graceful(&self) -> &Graceful {
        &self.graceful
    }

    /// Snapshot of the vhost list in insertion order.
    pub fn vhosts(&self) -> Vec<(String, Arc<VirtualHost>)> {
        self.vhosts.read().clone()
    }

    pub fn vhost(&self, host: &str) -> Option<Arc<VirtualHost>> {
        self.vhosts.read().iter().find(|(h, _)| h == host).map(|(_, v)| v.clone())
    }

    pub fn vhost_count(&self) -> usize {
        self.vhosts.read().len()
    }

    /// Install (or replace, keeping position) a virtual host.
    pub fn install_vhost(&self, host: String, vhost: Arc<VirtualHost>) {
        let mut vhosts = self.vhosts.write();
        match vhosts.iter_mut().find(|(existing, _)| *existing == host) {
            Some(slot) => slot.1 = vhost,
            None => vhosts.push((host, vhost)),
        }
    }

    pub fn remove_vhost(&self, host: &str) -> Option<Arc<VirtualHost>> {
        let mut vhosts = self.vhosts.write();
        let index = vhosts.iter().position(|(existing, _)| existing == host)?;
        Some(vhosts.remove(index).1)
    }

    /// Start serving. Runs every vhost's startup hooks first, then blocks
    /// until the listener exits.
    pub async fn start(self: &Arc<Self>) -> Result<(), ServerError> {
        for (host, vhost) in self.vhosts() {
            vhost.start().map_err(|source| ServerError::Hook { host, source })?;
        }

        let tls_config = if self.tls() {
            let sites: Vec<_> =
                self.vhosts().into_iter().map(|(host, vh)| (host, vh.tls_settings())).collect();
            let rustls = tls::build_server_config(&sites)?;
            Some(RustlsConfig::from_config(Arc::new(rustls)))
        } else {
            None
        };

        tracing::info!(address = %self.address, tls = self.tls(), "server starting");
        let result = self.graceful.serve(self.address, self.router(), tls_config).await;
        tracing::info!(address = %self.address, "server stopped");
        result.map_err(ServerError::Io)
    }

    /// Trigger a graceful stop with the given drain window. Non-blocking;
    /// use `graceful().wait_stopped()` for completion.
    pub fn stop(&self, timeout: Duration) {
        self.graceful.stop(timeout);
    }

    /// Begin a new serve epoch; returns the epoch the caller's serve task
    /// belongs to.
    pub fn begin_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// A fresh, unstarted copy of this server built from the current vhost
    /// configs. Used as a rollback backup where the live object itself will
    /// be restarted (the TLS-enable path).
    pub fn snapshot(&self) -> Result<Arc<Server>, crate::config::ConfigError> {
        let configs = self.vhosts().into_iter().map(|(_, vh)| vh.config()).collect();
        let drain = Duration::from_secs(3);
        Server::new(self.address, configs, self.tls(), drain)
    }

    pub fn describe(&self) -> ServerInfo {
        ServerInfo {
            address: self.address.to_string(),
            tls: self.tls(),
            virtual_hosts: self.vhosts().into_iter().map(|(_, vh)| vh.config()).collect(),
        }
    }

    fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(self.clone())
            .layer(CatchPanicLayer::new())
    }

    /// Route one request to the matching virtual host's stack.
    pub async fn serve_request(&self, request: axum::extract::Request) -> axum::response::Response {
        let host = request_host(&request);
        let vhost = host.as_deref().and_then(|h| self.vhost(h)).or_else(|| self.vhost("0.0.0.0"));

        let Some(vhost) = vhost else {
            let mut response = http::Response::new(Body::from(format!(
                "No such host at {}",
                self.address
            )));
            *response.status_mut() = StatusCode::NOT_FOUND;
            return response;
        };

        let mut response = vhost.stack().handle(request).await;
        response
            .headers_mut()
            .insert(header::SERVER, header::HeaderValue::from_static("helmsman"));

        // Error responses whose body nothing wrote get the status text.
        let status = response.status();
        if status.as_u16() >= 400 && response.body().size_hint().exact() == Some(0) {
            let text = format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or(""));
            *response.body_mut() = Body::from(text);
        }
        response
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("address", &self.address)
            .field("tls", &self.tls())
            .field("vhosts", &self.vhost_count())
            .finish()
    }
}

async fn dispatch(
    State(server): State<Arc<Server>>,
    request: axum::extract::Request,
) -> axum::response::Response {
    server.serve_request(request).await
}

/// The hostname a request is addressed to, without any port.
fn request_host(request: &axum::extract::Request) -> Option<String> {
    let raw = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().host().map(str::to_string))?;
    let (host, _) = split_host_port(&raw, 0);
    Some(host)
}
