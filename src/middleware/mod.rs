//! Middleware: the handler chain and the directive implementations.
//!
//! # Responsibilities
//! - Define the [`Handler`] and [`Middleware`] traits the chain is built from
//! - Fix the canonical compilation order of chain directives
//! - Construct middleware from parsed directives
//!
//! A virtual host's stack is a singly-linked chain of [`chain::Link`]s around
//! a terminal file server. Links have stable identity and a swappable next
//! pointer, so the admin API can splice single middleware in and out of a
//! live chain without rebuilding it.

pub mod basicauth;
pub mod chain;
pub mod ext;
pub mod file_server;
pub mod gzip;
pub mod log;

use crate::config::loader::ConfigError;
use crate::config::schema::{DirectiveSpec, SiteConfig};
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub use chain::{handler_before, Link};
pub use file_server::FileServer;

/// Request type flowing through the chain.
pub type Request = axum::extract::Request;

/// Response type produced by the chain.
pub type Response = axum::response::Response;

/// A boxed future, the return type of chain handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A handler somewhere in a virtual host's stack.
pub trait Handler: Send + Sync {
    fn handle<'a>(&'a self, request: Request) -> BoxFuture<'a, Response>;
}

/// Shared reference to a chain position.
pub type SharedHandler = Arc<dyn Handler>;

/// One middleware behavior: processes a request around the rest of the chain.
pub trait Middleware: Send + Sync {
    /// Handle `request`, delegating to `next` for the rest of the chain.
    fn handle<'a>(&'a self, request: Request, next: SharedHandler) -> BoxFuture<'a, Response>;

    /// Downcasting access, used by the admin API to edit middleware that
    /// carries runtime-mutable state (e.g. the extension list).
    fn as_any(&self) -> &dyn Any;
}

/// Canonical compilation order of chain directives. The first entry becomes
/// the outermost handler; splicing locates predecessors with this order.
pub const DIRECTIVE_ORDER: &[&str] = &["log", "gzip", "basicauth", "ext"];

/// Sort key of a directive within the canonical order.
pub fn order_of(name: &str) -> usize {
    DIRECTIVE_ORDER.iter().position(|d| *d == name).unwrap_or(usize::MAX)
}

/// Construct the middleware for one chain directive.
pub fn build(spec: &DirectiveSpec, site: &SiteConfig) -> Result<Box<dyn Middleware>, ConfigError> {
    match spec.name.as_str() {
        "log" => Ok(Box::new(log::Log)),
        "gzip" => Ok(Box::new(gzip::Gzip)),
        "basicauth" => match spec.args.as_slice() {
            [user, pass] => Ok(Box::new(basicauth::BasicAuth::new(user, pass))),
            _ => Err(ConfigError::BadDirective {
                line: 0,
                name: spec.name.clone(),
                message: "takes a username and a password".to_string(),
            }),
        },
        "ext" => Ok(Box::new(ext::Ext::new(site.root.clone(), spec.args.clone()))),
        _ => Err(ConfigError::UnknownDirective { line: 0, name: spec.name.clone() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_is_total_over_known_directives() {
        assert!(order_of("log") < order_of("gzip"));
        assert!(order_of("gzip") < order_of("basicauth"));
        assert!(order_of("basicauth") < order_of("ext"));
        assert_eq!(order_of("nonesuch"), usize::MAX);
    }

    #[test]
    fn build_rejects_unknown_directives() {
        let site = SiteConfig::new("localhost", 80);
        let spec = DirectiveSpec::new("nonesuch", vec![]);
        assert!(build(&spec, &site).is_err());
    }
}
