//! Request logging middleware.

use crate::middleware::{BoxFuture, Middleware, Request, Response, SharedHandler};
use std::any::Any;
use std::time::Instant;

/// Logs one line per request with method, path, status, and latency.
pub struct Log;

impl Middleware for Log {
    fn handle<'a>(&'a self, request: Request, next: SharedHandler) -> BoxFuture<'a, Response> {
        let method = request.method().clone();
        let uri = request.uri().clone();
        Box::pin(async move {
            let started = Instant::now();
            let response = next.handle(request).await;
            tracing::info!(
                target: "http_access",
                method = %method,
                path = %uri,
                status = response.status().as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
            );
            response
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
