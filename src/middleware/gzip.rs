//! Response compression middleware.

use crate::middleware::{BoxFuture, Middleware, Request, Response, SharedHandler};
use axum::body::Body;
use flate2::write::GzEncoder;
use flate2::Compression;
use http::header;
use http_body_util::BodyExt;
use std::any::Any;
use std::io::Write;

/// Responses smaller than this are not worth the encoder overhead.
const MIN_SIZE: usize = 256;

/// Gzip-compresses successful responses when the client accepts it.
pub struct Gzip;

impl Middleware for Gzip {
    fn handle<'a>(&'a self, request: Request, next: SharedHandler) -> BoxFuture<'a, Response> {
        let accepts_gzip = request
            .headers()
            .get(header::ACCEPT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').any(|enc| enc.trim().starts_with("gzip")))
            .unwrap_or(false);

        Box::pin(async move {
            let response = next.handle(request).await;
            if !accepts_gzip
                || !response.status().is_success()
                || response.headers().contains_key(header::CONTENT_ENCODING)
            {
                return response;
            }

            let (mut parts, body) = response.into_parts();
            let bytes = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(error) => {
                    tracing::error!(%error, "failed to read response body for compression");
                    return http::Response::builder()
                        .status(http::StatusCode::INTERNAL_SERVER_ERROR)
                        .body(Body::empty())
                        .unwrap_or_default();
                }
            };
            if bytes.len() < MIN_SIZE {
                return Response::from_parts(parts, Body::from(bytes));
            }

            let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
            let encoded = match encoder.write_all(&bytes).and_then(|_| encoder.finish()) {
                Ok(encoded) => encoded,
                Err(error) => {
                    tracing::error!(%error, "gzip encoding failed");
                    return Response::from_parts(parts, Body::from(bytes));
                }
            };

            parts.headers.remove(header::CONTENT_LENGTH);
            parts.headers.insert(header::CONTENT_ENCODING, header::HeaderValue::from_static("gzip"));
            parts.headers.append(header::VARY, header::HeaderValue::from_static("Accept-Encoding"));
            Response::from_parts(parts, Body::from(encoded))
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
