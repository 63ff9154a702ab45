//! Configuration: schema types, the text loader, and binding arrangement.

pub mod bindings;
pub mod loader;
pub mod schema;

pub use bindings::{arrange, Bindings};
pub use loader::{load, parse_directive, split_host_port, ConfigError};
pub use schema::{
    DirectiveSpec, Hook, HookResult, SiteConfig, TlsSettings, DEFAULT_HOST, DEFAULT_PORT,
};
