//! A web-server control plane.
//!
//! One long-running process hosts any number of HTTP/HTTPS listeners and,
//! while they serve traffic, accepts admin HTTP requests to create,
//! inspect, replace, reconfigure, and stop them. No change requires a
//! restart, and a broken change rolls back to the last working
//! configuration instead of leaving the process half-serving.
//!
//! # Architecture Overview
//!
//! ```text
//!   admin request ──▶ admin ──▶ lifecycle engine ──▶ registry mutation
//!                                     │                    │
//!                              health check /        start/stop via
//!                                 rollback          graceful listener
//!
//!   client ──▶ graceful listener ──▶ server (Host header) ──▶ vhost stack
//! ```
//!
//! - [`config`]: the text loader, schema types, and binding arrangement
//! - [`middleware`]: the handler chain and the directive implementations
//! - [`server`]: graceful listeners, virtual hosts, servers, the registry
//! - [`lifecycle`]: every registry mutation, health checks, rollback
//! - [`admin`]: the HTTP surface over the lifecycle engine

pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod middleware;
pub mod server;

pub use config::SiteConfig;
pub use lifecycle::{Engine, Options};
pub use server::{Registry, Server, VirtualHost};
