//! Process interrupt handling.
//!
//! First interrupt: stop every server gracefully (bounded by the shutdown
//! cutoff) and stop the admin listener. Second interrupt: force exit.

use crate::lifecycle::engine::Engine;
use axum_server::Handle;

pub async fn watch(engine: Engine, admin: Handle) {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("failed to install interrupt handler");
        return;
    }
    tracing::info!("interrupt received; shutting down");

    let cutoff = engine.options().shutdown_cutoff;
    engine.shutdown().await;
    admin.graceful_shutdown(Some(cutoff));

    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("second interrupt; forcing exit");
        std::process::exit(1);
    }
}
