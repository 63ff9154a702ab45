//! Servers: graceful listeners, virtual hosts, and the registry.

pub mod graceful;
pub mod registry;
#[allow(clippy::module_inception)]
pub mod server;
pub mod tls;
pub mod vhost;

pub use graceful::{is_ignorable, Graceful};
pub use registry::Registry;
pub use server::{Server, ServerError, ServerInfo};
pub use vhost::{HookError, InsertError, VirtualHost};
