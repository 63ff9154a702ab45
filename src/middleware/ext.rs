//! Extension-search middleware.
//!
//! Requests for a path with no file extension are retried against the
//! configured extension list: the first candidate that names a file under
//! the site root wins, and the request path is rewritten before the rest of
//! the chain runs. The root is captured when the middleware is built, so a
//! root change requires rebuilding the stack.

use crate::middleware::{BoxFuture, Middleware, Request, Response, SharedHandler};
use http::uri::Uri;
use parking_lot::RwLock;
use serde::Serialize;
use std::any::Any;
use std::path::PathBuf;

pub struct Ext {
    root: PathBuf,
    extensions: RwLock<Vec<String>>,
}

/// JSON shape of the middleware for the admin API.
#[derive(Debug, Serialize)]
pub struct ExtInfo {
    pub extensions: Vec<String>,
}

impl Ext {
    pub fn new(root: PathBuf, extensions: Vec<String>) -> Self {
        Self { root, extensions: RwLock::new(extensions) }
    }

    pub fn extensions(&self) -> Vec<String> {
        self.extensions.read().clone()
    }

    pub fn set_extensions(&self, extensions: Vec<String>) {
        *self.extensions.write() = extensions;
    }

    pub fn add_extension(&self, extension: String) {
        self.extensions.write().push(extension);
    }

    pub fn remove_extension(&self, extension: &str) {
        self.extensions.write().retain(|e| e != extension);
    }

    pub fn info(&self) -> ExtInfo {
        ExtInfo { extensions: self.extensions() }
    }

    /// Whether `path` is a candidate for extension search.
    fn searchable(path: &str) -> bool {
        if path.ends_with('/') {
            return false;
        }
        match path.rsplit_once('/') {
            Some((_, last)) => !last.contains('.'),
            None => false,
        }
    }

    async fn resolve(&self, path: &str) -> Option<String> {
        for extension in self.extensions() {
            let candidate = format!("{path}{extension}");
            let on_disk = self.root.join(candidate.trim_start_matches('/'));
            match tokio::fs::metadata(&on_disk).await {
                Ok(meta) if meta.is_file() => return Some(candidate),
                _ => continue,
            }
        }
        None
    }
}

impl Middleware for Ext {
    fn handle<'a>(&'a self, mut request: Request, next: SharedHandler) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let path = request.uri().path().to_string();
            if Self::searchable(&path) {
                if let Some(rewritten) = self.resolve(&path).await {
                    let path_and_query = match request.uri().query() {
                        Some(query) => format!("{rewritten}?{query}"),
                        None => rewritten,
                    };
                    let mut parts = request.uri().clone().into_parts();
                    if let Ok(pq) = path_and_query.parse() {
                        parts.path_and_query = Some(pq);
                        if let Ok(uri) = Uri::from_parts(parts) {
                            *request.uri_mut() = uri;
                        }
                    }
                }
            }
            next.handle(request).await
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
