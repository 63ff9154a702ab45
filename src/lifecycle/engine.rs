//! The lifecycle engine.
//!
//! # Responsibilities
//! - Start servers from arranged bindings, merging into live listeners
//! - Enforce binding uniqueness atomically with the appends
//! - Run serve tasks under the registry's wait group, with self-removal
//! - Stop one vhost, one server, or everything, gracefully
//! - Replace the whole registry atomically-by-rollback
//!
//! The engine owns the locking discipline: public operations acquire the
//! registry lock themselves, and the `*_locked` internals document when a
//! caller must already hold it.

use crate::config::{self, Bindings, ConfigError};
use crate::lifecycle::{health, Options};
use crate::server::registry::Registry;
use crate::server::server::{Server, ServerError};
use crate::server::vhost::HookError;
use crate::server::{is_ignorable, VirtualHost};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{host} already listening at {address}")]
    AlreadyListening { host: String, address: std::net::SocketAddr },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not start {host}: {source}")]
    Hook {
        host: String,
        #[source]
        source: HookError,
    },
}

/// An initialize call failed partway. Bindings processed before the
/// failure are already registered and running; `started` hands them back so
/// the admin surface can report the partial result instead of losing it.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct InitializeError {
    pub started: Vec<Arc<Server>>,
    pub source: LifecycleError,
}

impl From<LifecycleError> for InitializeError {
    fn from(source: LifecycleError) -> Self {
        Self { started: Vec::new(), source }
    }
}

impl From<ConfigError> for InitializeError {
    fn from(source: ConfigError) -> Self {
        LifecycleError::Config(source).into()
    }
}

/// What a stop request actually removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// One vhost went away; the listener keeps serving its other hosts.
    VirtualHost,
    /// The last vhost went away, taking the whole server with it.
    Server,
}

#[derive(Clone)]
pub struct Engine {
    registry: Arc<Registry>,
    options: Arc<Options>,
}

impl Engine {
    pub fn new(registry: Arc<Registry>, options: Options) -> Self {
        Self { registry, options: Arc::new(options) }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Parse, arrange, and start servers from configuration text.
    pub async fn initialize_from_text(
        &self,
        input: &str,
        replace: bool,
    ) -> Result<Vec<Arc<Server>>, InitializeError> {
        let configs = config::load(input, self.options.default_port)?;
        let bindings = config::arrange(configs).await?;
        self.initialize(bindings, replace).await
    }

    /// Start servers for `bindings`. With `replace` false, any (address,
    /// host) pair that already exists fails the whole call before any side
    /// effect. Bindings whose address already has a listener are merged into
    /// it (virtual hosts installed and started in place); the rest become
    /// new servers, started asynchronously. Returns the new servers so the
    /// caller can health-check them; on a mid-loop failure the error carries
    /// the new servers started by earlier bindings, which stay registered.
    pub async fn initialize(
        &self,
        bindings: Bindings,
        replace: bool,
    ) -> Result<Vec<Arc<Server>>, InitializeError> {
        let mut servers = self.registry.lock().await;

        if !replace {
            for (addr, configs) in &bindings {
                for config in configs {
                    if Registry::pair_exists(&servers, *addr, &config.host) {
                        return Err(LifecycleError::AlreadyListening {
                            host: config.host.clone(),
                            address: *addr,
                        }
                        .into());
                    }
                }
            }
        }

        let mut new_servers = Vec::new();
        for (addr, configs) in bindings {
            let tls = configs[0].tls.enabled;
            let built = match Server::new(addr, configs, tls, self.options.shutdown_cutoff) {
                Ok(built) => built,
                Err(error) => {
                    return Err(InitializeError {
                        started: new_servers,
                        source: error.into(),
                    })
                }
            };

            if let Some(existing) = servers.iter().find(|s| s.address() == addr).cloned() {
                // Merge: the address already has a listener, so the built
                // server only donates its virtual hosts.
                for (host, vhost) in built.vhosts() {
                    if let Err(source) = self.merge_vhost(&existing, host, vhost) {
                        return Err(InitializeError { started: new_servers, source });
                    }
                }
                continue;
            }

            servers.push(built.clone());
            new_servers.push(built.clone());
            self.start_server(built);
        }

        Ok(new_servers)
    }

    /// Install one vhost into a live server and run its startup hooks. A
    /// hook failure is returned to the caller; the host stays installed.
    fn merge_vhost(
        &self,
        existing: &Arc<Server>,
        host: String,
        vhost: Arc<VirtualHost>,
    ) -> Result<(), LifecycleError> {
        existing.install_vhost(host.clone(), vhost.clone());
        vhost.start().map_err(|source| LifecycleError::Hook { host, source })
    }

    /// Run a server's serve loop on a fresh task registered with the
    /// process-wide wait group. When the loop exits the server removes
    /// itself from the registry (unless it was restarted since). Errors that
    /// are expected fallout of a stop are suppressed.
    pub fn start_server(&self, server: Arc<Server>) {
        let registry = self.registry.clone();
        let epoch = server.begin_epoch();

        // The wait group covers only the serve span; the removal below runs
        // after the tracker token is released, so stop_all can hold the
        // registry lock while it drains the tracker.
        let serving = {
            let server = server.clone();
            registry.tracker().track_future(async move { server.start().await })
        };

        tokio::spawn(async move {
            let result = serving.await;
            match result {
                Ok(()) => {}
                Err(ServerError::Io(ref error)) if is_ignorable(error) => {}
                Err(error) => {
                    tracing::error!(address = %server.address(), %error, "server exited with error");
                }
            }
            registry.remove_stopped(&server, epoch).await;
        });
    }

    /// Gracefully stop every server in the list and wait until their serve
    /// tasks have terminated. The caller holds the registry lock.
    pub async fn stop_all_locked(&self, servers: &[Arc<Server>]) {
        for server in servers.iter() {
            server.stop(self.options.shutdown_cutoff);
        }
        let tracker = self.registry.tracker();
        tracker.close();
        tracker.wait().await;
        tracker.reopen();
    }

    /// Replace the entire registry with the servers described by `input`.
    ///
    /// The old servers are stopped and set aside as a backup; if the new
    /// configuration fails before any listener starts, the backup is
    /// reinstated and the error returned. Otherwise a health check runs
    /// against every new listener and rolls back (at most once) on failure.
    /// Between the stop and the new binds no traffic is served; that window
    /// is the cost of a full replace.
    pub async fn replace_all(&self, input: &str) -> Result<(), LifecycleError> {
        let backup = {
            let mut servers = self.registry.lock().await;
            let backup = servers.clone();
            self.stop_all_locked(&servers).await;
            servers.clear();
            backup
        };

        match self.initialize_from_text(input, false).await {
            Err(error) => {
                // Whatever did start is still in the registry; the rollback
                // stops it along with everything else before reinstating
                // the backup.
                health::rollback(self.clone(), backup);
                Err(error.source)
            }
            Ok(new_servers) => {
                health::check_and_rollback(self.clone(), new_servers, backup);
                Ok(())
            }
        }
    }

    /// Stop one vhost, or the whole server when it is the last one.
    pub async fn stop_server(&self, host: &str, port: u16) -> Option<StopOutcome> {
        let mut servers = self.registry.lock().await;
        let (server, vhost) = Registry::find(&servers, host, port)?;

        vhost.stop();
        // The found vhost may be the wildcard standing in for `host`.
        server.remove_vhost(&vhost.hostname());

        if server.vhost_count() == 0 {
            server.stop(self.options.shutdown_cutoff);
            servers.retain(|other| !Arc::ptr_eq(other, &server));
            return Some(StopOutcome::Server);
        }
        Some(StopOutcome::VirtualHost)
    }

    /// Stop everything: the process-exit path.
    pub async fn shutdown(&self) {
        let mut servers = self.registry.lock().await;
        self.stop_all_locked(&servers).await;
        servers.clear();
    }

    /// Wait up to the configured startup window for every listed server to
    /// report its socket bound.
    pub async fn wait_listening(&self, servers: &[Arc<Server>]) -> bool {
        for server in servers {
            if !server.graceful().wait_listening(self.options.startup_wait).await {
                return false;
            }
        }
        true
    }

    /// Stop every vhost of a failed server without touching the registry;
    /// the health-check path uses this before rolling back.
    pub(crate) fn stop_vhosts(server: &Arc<Server>) {
        for (_, vhost) in server.vhosts() {
            vhost.stop();
        }
    }
}
