//! HTTP basic authentication middleware.

use crate::middleware::{BoxFuture, Middleware, Request, Response, SharedHandler};
use axum::body::Body;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http::{header, StatusCode};
use std::any::Any;

/// Guards the rest of the chain behind a single username/password pair.
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }

    fn authorized(&self, request: &Request) -> bool {
        let Some(value) = request.headers().get(header::AUTHORIZATION) else {
            return false;
        };
        let Some(encoded) = value.to_str().ok().and_then(|v| v.strip_prefix("Basic ")) else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(credentials) = String::from_utf8(decoded) else {
            return false;
        };
        match credentials.split_once(':') {
            Some((user, pass)) => user == self.username && pass == self.password,
            None => false,
        }
    }
}

impl Middleware for BasicAuth {
    fn handle<'a>(&'a self, request: Request, next: SharedHandler) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if self.authorized(&request) {
                next.handle(request).await
            } else {
                http::Response::builder()
                    .status(StatusCode::UNAUTHORIZED)
                    .header(header::WWW_AUTHENTICATE, "Basic realm=\"Restricted\"")
                    .body(Body::empty())
                    .unwrap_or_default()
            }
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
