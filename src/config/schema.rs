//! Site configuration types.
//!
//! This module defines the configuration structures produced by the loader
//! and consumed by the lifecycle engine. All types serialize to JSON for the
//! admin API (hooks are skipped: they are closures, not data).

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Port used when a site address does not name one.
pub const DEFAULT_PORT: u16 = 2015;

/// Host used when a site address names only a port.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Configuration for one site (one hostname on one listener).
#[derive(Debug, Clone, Serialize)]
pub struct SiteConfig {
    /// Hostname the site answers to.
    pub host: String,

    /// TCP port the site listens on.
    pub port: u16,

    /// Directory the terminal file server is rooted at.
    pub root: PathBuf,

    /// TLS settings for this site.
    pub tls: TlsSettings,

    /// Chain directives in canonical compilation order.
    pub directives: Vec<DirectiveSpec>,

    /// Hooks run when the site starts, in declaration order.
    #[serde(skip)]
    pub startup: Vec<Hook>,

    /// Hooks run when the site stops, in declaration order.
    #[serde(skip)]
    pub shutdown: Vec<Hook>,
}

impl SiteConfig {
    /// Create a config with defaults for everything but the address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            root: PathBuf::from("."),
            tls: TlsSettings::default(),
            directives: Vec::new(),
            startup: Vec::new(),
            shutdown: Vec::new(),
        }
    }

    /// The "host:port" form of this site's address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// TLS settings for one site.
#[derive(Debug, Clone, Serialize)]
pub struct TlsSettings {
    /// Whether the site is served over TLS.
    pub enabled: bool,

    /// Path to the certificate chain (PEM).
    pub certificate: PathBuf,

    /// Path to the private key (PEM).
    pub key: PathBuf,

    /// Lowest protocol version offered ("tls1.2" or "tls1.3").
    pub protocol_min: String,

    /// Highest protocol version offered.
    pub protocol_max: String,

    /// Cipher suite names to restrict to; empty means no restriction.
    pub ciphers: Vec<String>,

    /// Client CA certificates (PEM paths). Non-empty enables client auth.
    pub client_certs: Vec<PathBuf>,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            certificate: PathBuf::new(),
            key: PathBuf::new(),
            protocol_min: "tls1.2".to_string(),
            protocol_max: "tls1.3".to_string(),
            ciphers: Vec::new(),
            client_certs: Vec::new(),
        }
    }
}

/// One parsed middleware directive: a name plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectiveSpec {
    pub name: String,
    pub args: Vec<String>,
}

impl DirectiveSpec {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self { name: name.into(), args }
    }
}

/// Result type for startup/shutdown hooks.
pub type HookResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A named startup or shutdown action attached to a site.
///
/// Hooks created from `startup`/`shutdown` directives run a shell command;
/// tests install closures directly.
#[derive(Clone)]
pub struct Hook {
    name: String,
    func: Arc<dyn Fn() -> HookResult + Send + Sync>,
}

impl Hook {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn() -> HookResult + Send + Sync + 'static,
    ) -> Self {
        Self { name: name.into(), func: Arc::new(func) }
    }

    /// A hook that runs `command` through the shell and fails on a non-zero
    /// exit status.
    pub fn command(command: impl Into<String>) -> Self {
        let command = command.into();
        let name = command.clone();
        Self::new(name, move || {
            let status = std::process::Command::new("sh").arg("-c").arg(&command).status()?;
            if status.success() {
                Ok(())
            } else {
                Err(format!("command exited with {status}").into())
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run(&self) -> HookResult {
        (self.func)()
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook").field("name", &self.name).finish_non_exhaustive()
    }
}
