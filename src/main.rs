//! Process bootstrap: flags, logging, initial load, admin serve, signals.

use clap::Parser;
use helmsman::admin::{self, AdminState};
use helmsman::lifecycle::{signals, Engine, Options};
use helmsman::server::Registry;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "helmsman", about = "A web-server control plane", version)]
struct Flags {
    /// Site configuration file to load at startup (and on /cmd/reload).
    #[arg(long)]
    conf: Option<PathBuf>,

    /// Address the admin API listens on.
    #[arg(long, default_value = "127.0.0.1:5555")]
    admin: SocketAddr,

    /// Bearer token required by the admin API.
    #[arg(long)]
    api_key: Option<String>,

    /// Default port for site addresses that do not name one.
    #[arg(long, default_value_t = helmsman::config::DEFAULT_PORT)]
    port: u16,

    /// Log filter when RUST_LOG is not set.
    #[arg(long, default_value = "helmsman=info,http_access=info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let flags = Flags::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| flags.log.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // One process-wide TLS provider; listeners and the health-check client
    // both depend on it being unambiguous.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "TLS crypto provider already installed")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "helmsman starting");

    let registry = Arc::new(Registry::new());
    let engine = Engine::new(registry, Options { default_port: flags.port, ..Options::default() });

    if let Some(path) = &flags.conf {
        let text = std::fs::read_to_string(path)?;
        let servers = engine.initialize_from_text(&text, false).await?;
        tracing::info!(
            config = %path.display(),
            servers = servers.len(),
            "initial configuration loaded"
        );
    }

    let state = AdminState {
        engine: engine.clone(),
        config_path: flags.conf,
        api_key: flags.api_key,
    };

    let admin_handle = axum_server::Handle::new();
    tokio::spawn(signals::watch(engine, admin_handle.clone()));

    admin::serve(state, flags.admin, admin_handle).await?;

    tracing::info!("shutdown complete");
    Ok(())
}
