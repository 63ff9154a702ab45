//! Health checking and rollback.
//!
//! # Design Decisions
//! - Dedicated client per probe, with its own timeout, never the serving
//!   stack's connections
//! - The probe gates on the listener's own "listening" signal, bounded by a
//!   fixed delay, instead of sleeping blind
//! - Certificate verification is disabled: the probe asks "is something
//!   serving", not "is the certificate valid"
//! - Rollback is guarded by a fresh once-flag per replace, so any number of
//!   failing servers produce exactly one rollback

use crate::lifecycle::engine::Engine;
use crate::server::server::Server;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long one loopback probe may take end to end.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Probe every new server in parallel; the first failure stops that
/// server's vhosts and rolls the registry back to `backup`. At most one
/// rollback fires per call, however many probes fail. Non-blocking.
pub fn check_and_rollback(engine: Engine, new_servers: Vec<Arc<Server>>, backup: Vec<Arc<Server>>) {
    let rolled_back = Arc::new(AtomicBool::new(false));

    for server in new_servers {
        let engine = engine.clone();
        let backup = backup.clone();
        let rolled_back = rolled_back.clone();
        tokio::spawn(async move {
            if let Err(error) = probe(&engine, &server).await {
                tracing::warn!(
                    address = %server.address(),
                    %error,
                    "health check failed"
                );
                // These vhosts were started without knowing the socket
                // would not serve.
                Engine::stop_vhosts(&server);
                server.stop(Duration::ZERO);

                if !rolled_back.swap(true, Ordering::SeqCst) {
                    rollback(engine, backup);
                }
            }
        });
    }
}

/// Probe one reconfigured server; on failure, swap it for `backup` (a
/// pre-change snapshot) instead of touching the rest of the registry. The
/// in-place restart paths (TLS enablement) use this singleton form.
pub fn check_and_restore(engine: Engine, server: Arc<Server>, backup: Arc<Server>) {
    tokio::spawn(async move {
        if let Err(error) = probe(&engine, &server).await {
            tracing::warn!(
                address = %server.address(),
                %error,
                "health check failed; restoring the previous server"
            );
            Engine::stop_vhosts(&server);
            server.stop(Duration::ZERO);
            server.graceful().wait_stopped().await;

            let mut servers = engine.registry().lock().await;
            servers.retain(|other| !Arc::ptr_eq(other, &server));
            servers.push(backup.clone());
            engine.start_server(backup);
        }
    });
}

/// Reinstall `backup` as the entire registry: stop whatever is running,
/// swap the list, and restart every backed-up server. Best-effort and
/// non-blocking; a server whose port has been taken in the meantime logs
/// its error and drops out of the registry on its own.
pub fn rollback(engine: Engine, backup: Vec<Arc<Server>>) {
    tokio::spawn(async move {
        tracing::warn!("rolling back to the last working configuration");
        let mut servers = engine.registry().lock().await;
        engine.stop_all_locked(&servers).await;
        *servers = backup;
        for server in servers.iter().cloned().collect::<Vec<_>>() {
            engine.start_server(server);
        }
    });
}

/// One loopback GET against the server's bound address.
async fn probe(engine: &Engine, server: &Arc<Server>) -> Result<(), reqwest::Error> {
    server.graceful().wait_listening(engine.options().health_check_delay).await;

    let scheme = if server.tls() { "https" } else { "http" };
    let url = format!("{scheme}://{}", server.address());

    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(PROBE_TIMEOUT)
        .no_proxy()
        .build()?;
    client.get(url).send().await?;
    Ok(())
}
