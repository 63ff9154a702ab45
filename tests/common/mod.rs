//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::body::Body;
use axum::Router;
use helmsman::admin::{self, AdminState};
use helmsman::lifecycle::{Engine, Options};
use helmsman::server::Registry;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::path::Path;
use std::sync::{Arc, Once};
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

static CRYPTO: Once = Once::new();

/// Install the process-wide TLS provider exactly once per test binary.
pub fn init_crypto() {
    CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// An engine with test-friendly windows.
pub fn engine() -> Engine {
    init_crypto();
    Engine::new(
        Arc::new(Registry::new()),
        Options {
            shutdown_cutoff: Duration::from_millis(500),
            health_check_delay: Duration::from_secs(2),
            startup_wait: Duration::from_secs(2),
            default_port: 2015,
        },
    )
}

/// The admin router over `engine`, with no auth and no config file.
pub fn admin_router(engine: &Engine) -> Router {
    admin::router(AdminState { engine: engine.clone(), config_path: None, api_key: None })
}

/// Grab an ephemeral port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

/// A site root populated with the given (name, contents) files.
pub fn site_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }
    dir
}

/// Drive one request through the admin router without a socket.
pub async fn admin_request(
    router: &Router,
    method: &str,
    uri: &str,
    body: impl Into<Body>,
) -> (StatusCode, bytes::Bytes) {
    let request = Request::builder().method(method).uri(uri).body(body.into()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes)
}

/// Like [`admin_request`] but with a content type, for forms and JSON.
pub async fn admin_request_typed(
    router: &Router,
    method: &str,
    uri: &str,
    content_type: &str,
    body: impl Into<Body>,
) -> (StatusCode, bytes::Bytes) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, content_type)
        .body(body.into())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes)
}

/// A client suitable for probing test listeners.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(2))
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// GET `path` on 127.0.0.1:`port` with an explicit Host header.
pub async fn get_as_host(port: u16, host: &str, path: &str) -> Option<(StatusCode, String)> {
    let response = client()
        .get(format!("http://127.0.0.1:{port}{path}"))
        .header(reqwest::header::HOST, host)
        .send()
        .await
        .ok()?;
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
    let body = response.text().await.ok()?;
    Some((status, body))
}

/// Poll until `condition` holds or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Path as it appears inside a config file.
pub fn root_line(dir: &Path) -> String {
    format!("root {}", dir.display())
}
