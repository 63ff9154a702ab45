//! Terminal static file handler.

use crate::middleware::{BoxFuture, Handler, Request, Response};
use axum::body::Body;
use std::path::Path;
use tower::util::ServiceExt;
use tower_http::services::ServeDir;

/// The innermost handler of every stack: serves files from the site root.
pub struct FileServer {
    inner: ServeDir,
}

impl FileServer {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { inner: ServeDir::new(root) }
    }
}

impl Handler for FileServer {
    fn handle<'a>(&'a self, request: Request) -> BoxFuture<'a, Response> {
        let service = self.inner.clone();
        Box::pin(async move {
            match service.oneshot(request).await {
                Ok(response) => response.map(Body::new),
                Err(infallible) => match infallible {},
            }
        })
    }
}
