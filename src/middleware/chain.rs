//! Chain links: installed middleware with stable identity.

use crate::middleware::{
    BoxFuture, Handler, Middleware, Request, Response, SharedHandler, DIRECTIVE_ORDER,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// One installed middleware in a virtual host's chain.
///
/// A link pairs a middleware behavior with its position: the `next` pointer
/// targets whatever currently follows it (another link or the terminal file
/// server). Splice operations swap exactly one `next` pointer; the link
/// itself, and therefore its identity in the directive map, never moves.
pub struct Link {
    directive: String,
    middleware: Box<dyn Middleware>,
    next: RwLock<SharedHandler>,
}

impl Link {
    pub fn new(
        directive: impl Into<String>,
        middleware: Box<dyn Middleware>,
        next: SharedHandler,
    ) -> Self {
        Self { directive: directive.into(), middleware, next: RwLock::new(next) }
    }

    /// The directive this link was installed under.
    pub fn directive(&self) -> &str {
        &self.directive
    }

    pub fn middleware(&self) -> &dyn Middleware {
        self.middleware.as_ref()
    }

    /// The handler currently following this link.
    pub fn next(&self) -> SharedHandler {
        self.next.read().clone()
    }

    /// Point this link at a new successor.
    pub fn set_next(&self, next: SharedHandler) {
        *self.next.write() = next;
    }
}

impl Handler for Link {
    fn handle<'a>(&'a self, request: Request) -> BoxFuture<'a, Response> {
        let next = self.next();
        self.middleware.handle(request, next)
    }
}

/// Find the installed link that precedes `directive` in the canonical order,
/// i.e. the link whose `next` pointer targets the position where `directive`
/// lives (or must be spliced in). `None` means `directive` is outermost.
pub fn handler_before(
    directive: &str,
    handlers: &HashMap<String, Arc<Link>>,
) -> Option<Arc<Link>> {
    let position = DIRECTIVE_ORDER.iter().position(|d| *d == directive)?;
    DIRECTIVE_ORDER[..position]
        .iter()
        .rev()
        .find_map(|candidate| handlers.get(*candidate).cloned())
}
