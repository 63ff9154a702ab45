//! The server registry: the single source of truth for what is listening.
//!
//! One coarse async mutex guards the ordered server list; every admin
//! operation and every lifecycle mutation runs its whole read-modify-write
//! span under it. The registry also owns the process-wide task tracker that
//! serve tasks register with, so "wait for all servers to terminate" has one
//! answer.

use crate::server::server::Server;
use crate::server::vhost::VirtualHost;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::task::TaskTracker;

#[derive(Default)]
pub struct Registry {
    servers: Mutex<Vec<Arc<Server>>>,
    tracker: TaskTracker,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the registry lock. Hold it across the whole span that reads
    /// and mutates the server list.
    pub async fn lock(&self) -> MutexGuard<'_, Vec<Arc<Server>>> {
        self.servers.lock().await
    }

    /// The wait group tracking live serve tasks.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Remove a server by identity, but only while it is still in the serve
    /// epoch the caller observed: a server restarted since then stays.
    pub async fn remove_stopped(&self, server: &Arc<Server>, epoch: u64) {
        let mut servers = self.servers.lock().await;
        servers.retain(|other| !(Arc::ptr_eq(other, server) && other.epoch() == epoch));
    }

    /// Find the server bound to `port` that hosts `host`, falling back to a
    /// server whose wildcard host covers it.
    pub fn find(
        servers: &[Arc<Server>],
        host: &str,
        port: u16,
    ) -> Option<(Arc<Server>, Arc<VirtualHost>)> {
        let on_port = |wanted: &str| {
            servers.iter().find_map(|server| {
                if server.address().port() != port {
                    return None;
                }
                server.vhost(wanted).map(|vhost| (server.clone(), vhost))
            })
        };
        on_port(host).or_else(|| on_port("0.0.0.0"))
    }

    /// Whether any server already claims the (address, host) pair.
    pub fn pair_exists(
        servers: &[Arc<Server>],
        addr: std::net::SocketAddr,
        host: &str,
    ) -> bool {
        servers
            .iter()
            .any(|server| server.address() == addr && server.vhost(host).is_some())
    }
}
