//! End-to-end scenarios over the admin API and live listeners.

use http::StatusCode;
use std::time::Duration;

mod common;

#[tokio::test]
async fn create_starts_every_address_with_its_middleware() {
    let engine = common::engine();
    let router = common::admin_router(&engine);
    // Large enough that the gzip middleware bothers compressing it.
    let page = format!("<html>front page of the internet {}</html>", "padding ".repeat(100));
    let dir = common::site_dir(&[("index.html", &page)]);

    let (p1, p2) = (common::free_port(), common::free_port());
    let config = format!(
        "localhost:{p1}, 127.0.0.1:{p2}\ngzip\n{}\n",
        common::root_line(dir.path())
    );

    let (status, _) = common::admin_request(&router, "POST", "/", config).await;
    assert_eq!(status, StatusCode::CREATED);

    // Both addresses answer.
    for (port, host) in [(p1, "localhost"), (p2, "127.0.0.1")] {
        let (status, body) = common::get_as_host(port, host, "/index.html").await.unwrap();
        assert_eq!(status, StatusCode::OK, "port {port} did not serve");
        assert!(body.contains("front page"));
    }

    // Both vhosts carry the gzip directive, and it actually compresses.
    let (_, body) = common::admin_request(&router, "GET", "/", "").await;
    let listing: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(listing.as_array().unwrap().len(), 2);
    for server in listing.as_array().unwrap() {
        let directives = &server["virtual_hosts"][0]["directives"];
        assert!(directives.as_array().unwrap().iter().any(|d| d["name"] == "gzip"));
    }

    let response = common::client()
        .get(format!("http://127.0.0.1:{p2}/index.html"))
        .header(reqwest::header::ACCEPT_ENCODING, "gzip")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["content-encoding"], "gzip");

    engine.shutdown().await;
}

#[tokio::test]
async fn create_merges_into_an_existing_listener() {
    let engine = common::engine();
    let router = common::admin_router(&engine);
    let dir = common::site_dir(&[("index.html", "shared listener")]);
    let port = common::free_port();

    let first = format!("localhost:{port}\n{}\n", common::root_line(dir.path()));
    let (status, _) = common::admin_request(&router, "POST", "/", first).await;
    assert_eq!(status, StatusCode::CREATED);

    // Same resolved socket, different hostname: no new listener, one more
    // vhost on the existing server.
    let second = format!("127.0.0.1:{port}\n{}\n", common::root_line(dir.path()));
    let (status, _) = common::admin_request(&router, "POST", "/", second).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = common::admin_request(&router, "GET", "/", "").await;
    let listing: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(listing.as_array().unwrap().len(), 1, "merge must not add a listener");
    assert_eq!(listing[0]["virtual_hosts"].as_array().unwrap().len(), 2);

    let (status, _) = common::get_as_host(port, "127.0.0.1", "/index.html").await.unwrap();
    assert_eq!(status, StatusCode::OK);

    engine.shutdown().await;
}

#[tokio::test]
async fn duplicate_create_without_replace_changes_nothing() {
    let engine = common::engine();
    let router = common::admin_router(&engine);
    let dir = common::site_dir(&[("index.html", "original")]);
    let port = common::free_port();

    let config = format!("127.0.0.1:{port}\n{}\n", common::root_line(dir.path()));
    let (status, _) = common::admin_request(&router, "POST", "/", config.clone()).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = common::admin_request(&router, "POST", "/", config).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["status"], "error");

    let (_, body) = common::admin_request(&router, "GET", "/", "").await;
    let listing: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(listing.as_array().unwrap().len(), 1);
    assert_eq!(listing[0]["virtual_hosts"].as_array().unwrap().len(), 1);

    // The original keeps serving untouched.
    let (status, body) = common::get_as_host(port, "127.0.0.1", "/index.html").await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "original");

    engine.shutdown().await;
}

#[tokio::test]
async fn root_change_rebuilds_the_stack_for_extension_search() {
    let engine = common::engine();
    let router = common::admin_router(&engine);
    let fizz = common::site_dir(&[]);
    let buzz = common::site_dir(&[("hello.testing", "found under the new root")]);
    let port = common::free_port();

    let config = format!("localhost:{port}\next .testing\n{}\n", common::root_line(fizz.path()));
    let (status, _) = common::admin_request(&router, "POST", "/", config).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = common::get_as_host(port, "localhost", "/hello").await.unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);

    let form = format!("root={}", buzz.path().display());
    let (status, _) = common::admin_request_typed(
        &router,
        "PUT",
        &format!("/localhost:{port}/root"),
        "application/x-www-form-urlencoded",
        form,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The config reflects the new root...
    let (status, body) =
        common::admin_request(&router, "GET", &format!("/localhost:{port}"), "").await;
    assert_eq!(status, StatusCode::OK);
    let config: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(config["root"], buzz.path().display().to_string());

    // ...and so does the ext middleware, because the stack was rebuilt.
    let (status, body) = common::get_as_host(port, "localhost", "/hello").await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "found under the new root");

    engine.shutdown().await;
}

#[tokio::test]
async fn failed_replace_rolls_back_to_the_previous_listener() {
    let engine = common::engine();
    let router = common::admin_router(&engine);
    let dir = common::site_dir(&[("index.html", "survivor")]);
    let port = common::free_port();

    let config = format!("127.0.0.1:{port}\n{}\n", common::root_line(dir.path()));
    let (status, _) = common::admin_request(&router, "POST", "/", config).await;
    assert_eq!(status, StatusCode::CREATED);

    // Hold a port so the replacement cannot bind it.
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let blocked_port = blocker.local_addr().unwrap().port();

    let (status, _) = common::admin_request(
        &router,
        "PUT",
        "/",
        format!("127.0.0.1:{blocked_port}\n"),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    // The health check fails against the unbindable port and rollback
    // restores the original listener.
    let restored = common::eventually(Duration::from_secs(10), || async {
        matches!(
            common::get_as_host(port, "127.0.0.1", "/index.html").await,
            Some((StatusCode::OK, body)) if body == "survivor"
        )
    })
    .await;
    assert!(restored, "original listener never came back");

    let (_, body) = common::admin_request(&router, "GET", "/", "").await;
    let listing: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let addresses: Vec<_> = listing
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["address"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(addresses, vec![format!("127.0.0.1:{port}")]);

    engine.shutdown().await;
}

#[tokio::test]
async fn deleting_one_vhost_keeps_the_listener_serving() {
    let engine = common::engine();
    let router = common::admin_router(&engine);
    let dir = common::site_dir(&[("index.html", "still here")]);
    let port = common::free_port();

    let config = format!("localhost:{port}, 127.0.0.1:{port}\n{}\n", common::root_line(dir.path()));
    let (status, _) = common::admin_request(&router, "POST", "/", config).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) =
        common::admin_request(&router, "DELETE", &format!("/localhost:{port}"), "").await;
    assert_eq!(status, StatusCode::ACCEPTED);

    // The other vhost keeps serving on the same listener.
    let (status, body) = common::get_as_host(port, "127.0.0.1", "/index.html").await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "still here");

    // The removed one is gone.
    let (status, body) = common::get_as_host(port, "localhost", "/index.html").await.unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("No such host"));

    let (_, body) = common::admin_request(&router, "GET", "/", "").await;
    let listing: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(listing.as_array().unwrap().len(), 1);
    assert_eq!(listing[0]["virtual_hosts"].as_array().unwrap().len(), 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn stop_is_acknowledged_once_then_not_found() {
    let engine = common::engine();
    let router = common::admin_router(&engine);
    let dir = common::site_dir(&[]);
    let port = common::free_port();

    let config = format!("127.0.0.1:{port}\n{}\n", common::root_line(dir.path()));
    let (status, _) = common::admin_request(&router, "POST", "/", config).await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/127.0.0.1:{port}");
    let (status, _) = common::admin_request(&router, "DELETE", &uri, "").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, _) = common::admin_request(&router, "DELETE", &uri, "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The port is actually released.
    let freed = common::eventually(Duration::from_secs(5), || async {
        std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
    })
    .await;
    assert!(freed, "listener kept the port after stop");

    engine.shutdown().await;
}

#[tokio::test]
async fn info_round_trips_the_submitted_configuration() {
    let engine = common::engine();
    let router = common::admin_router(&engine);
    let dir = common::site_dir(&[]);
    let port = common::free_port();

    let config = format!(
        "localhost:{port}\ngzip\next .html .htm\n{}\n",
        common::root_line(dir.path())
    );
    let (status, _) = common::admin_request(&router, "POST", "/", config).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) =
        common::admin_request(&router, "GET", &format!("/localhost:{port}"), "").await;
    assert_eq!(status, StatusCode::OK);
    let config: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(config["host"], "localhost");
    assert_eq!(config["port"].as_u64(), Some(u64::from(port)));
    let names: Vec<_> = config["directives"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["gzip", "ext"]);
    assert_eq!(config["directives"][1]["args"], serde_json::json!([".html", ".htm"]));

    let (status, _) = common::admin_request(&router, "GET", "/unknown:9999", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    engine.shutdown().await;
}
