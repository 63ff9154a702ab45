//! Virtual hosts.
//!
//! A virtual host is one site served by one hostname on one listener. It
//! owns its configuration and the composed middleware stack; several virtual
//! hosts can share a listener, which is what makes a `Server` more than a
//! socket.

use crate::config::loader::ConfigError;
use crate::config::schema::{DirectiveSpec, SiteConfig, TlsSettings};
use crate::middleware::{self, handler_before, FileServer, Link, SharedHandler};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// A startup hook failed, aborting the virtual host's start.
#[derive(Debug, Error)]
#[error("startup hook '{hook}' failed: {source}")]
pub struct HookError {
    pub hook: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// Inserting a middleware into a live chain failed.
#[derive(Debug, Error)]
pub enum InsertError {
    #[error("middleware '{0}' already installed")]
    Exists(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub struct VirtualHost {
    config: RwLock<SiteConfig>,
    stack: RwLock<SharedHandler>,
    handlers: RwLock<HashMap<String, Arc<Link>>>,
}

impl VirtualHost {
    /// Build a virtual host and compile its stack.
    pub fn new(config: SiteConfig) -> Result<Arc<Self>, ConfigError> {
        let stack: SharedHandler = Arc::new(FileServer::new(&config.root));
        let vhost = Arc::new(Self {
            config: RwLock::new(config),
            stack: RwLock::new(stack),
            handlers: RwLock::new(HashMap::new()),
        });
        vhost.build_stack()?;
        Ok(vhost)
    }

    pub fn config(&self) -> SiteConfig {
        self.config.read().clone()
    }

    pub fn hostname(&self) -> String {
        self.config.read().host.clone()
    }

    pub fn tls_enabled(&self) -> bool {
        self.config.read().tls.enabled
    }

    pub fn tls_settings(&self) -> TlsSettings {
        self.config.read().tls.clone()
    }

    /// Replace the site root. The caller must hold the registry lock and
    /// re-run [`build_stack`] afterwards so that middleware caching the root
    /// observes the change.
    ///
    /// [`build_stack`]: VirtualHost::build_stack
    pub fn set_root(&self, root: PathBuf) {
        self.config.write().root = root;
    }

    /// Install TLS settings (marking them enabled), as the admin TLS
    /// operation does before restarting the server.
    pub fn set_tls(&self, settings: TlsSettings) {
        self.config.write().tls = settings;
    }

    /// The current outermost handler.
    pub fn stack(&self) -> SharedHandler {
        self.stack.read().clone()
    }

    /// The chain link installed for `directive`, if any.
    pub fn handler(&self, directive: &str) -> Option<Arc<Link>> {
        self.handlers.read().get(directive).cloned()
    }

    /// Recompile the stack from the config's directive list, folding
    /// right-to-left around a file server at the site root so the
    /// first-ordered directive ends up outermost. Idempotent for an
    /// unchanged config.
    pub fn build_stack(&self) -> Result<(), ConfigError> {
        let config = self.config();

        let mut stack: SharedHandler = Arc::new(FileServer::new(&config.root));
        let mut handlers = HashMap::new();
        for spec in config.directives.iter().rev() {
            let mw = middleware::build(spec, &config)?;
            let link = Arc::new(Link::new(spec.name.clone(), mw, stack));
            handlers.insert(spec.name.clone(), link.clone());
            stack = link;
        }

        let mut installed = self.handlers.write();
        *self.stack.write() = stack;
        *installed = handlers;
        Ok(())
    }

    /// Splice a new middleware into the live chain at its canonical
    /// position. Rejects duplicates. Caller holds the registry lock.
    pub fn insert_middleware(&self, spec: DirectiveSpec) -> Result<(), InsertError> {
        let mw = {
            let config = self.config.read();
            middleware::build(&spec, &config)?
        };

        {
            let mut handlers = self.handlers.write();
            if handlers.contains_key(&spec.name) {
                return Err(InsertError::Exists(spec.name));
            }
            match handler_before(&spec.name, &handlers) {
                None => {
                    // New outermost handler: wrap the whole stack.
                    let mut stack = self.stack.write();
                    let link = Arc::new(Link::new(spec.name.clone(), mw, stack.clone()));
                    *stack = link.clone();
                    handlers.insert(spec.name.clone(), link);
                }
                Some(before) => {
                    let link = Arc::new(Link::new(spec.name.clone(), mw, before.next()));
                    before.set_next(link.clone());
                    handlers.insert(spec.name.clone(), link);
                }
            }
        }

        let mut config = self.config.write();
        config.directives.retain(|d| d.name != spec.name);
        config.directives.push(spec);
        config.directives.sort_by_key(|d| middleware::order_of(&d.name));
        Ok(())
    }

    /// Splice the middleware installed for `directive` out of the live
    /// chain. Returns false when it is not installed. Caller holds the
    /// registry lock.
    pub fn remove_middleware(&self, directive: &str) -> bool {
        {
            let mut handlers = self.handlers.write();
            let Some(link) = handlers.get(directive).cloned() else {
                return false;
            };
            let next = link.next();
            match handler_before(directive, &handlers) {
                None => *self.stack.write() = next,
                Some(before) => before.set_next(next),
            }
            handlers.remove(directive);
        }

        self.config.write().directives.retain(|d| d.name != directive);
        true
    }

    /// Run startup hooks in declaration order; the first failure aborts.
    pub fn start(&self) -> Result<(), HookError> {
        let hooks = self.config.read().startup.clone();
        for hook in hooks {
            hook.run().map_err(|source| HookError { hook: hook.name().to_string(), source })?;
        }
        Ok(())
    }

    /// Run shutdown hooks in declaration order; failures are reported but do
    /// not stop later hooks.
    pub fn stop(&self) {
        let hooks = self.config.read().shutdown.clone();
        for hook in hooks {
            if let Err(error) = hook.run() {
                tracing::error!(hook = hook.name(), %error, "shutdown hook failed");
            }
        }
    }
}
