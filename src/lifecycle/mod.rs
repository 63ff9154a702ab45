//! Lifecycle: every mutation of the server registry goes through here.
//!
//! # Data Flow
//! ```text
//! create/reload:
//!     text → loader → bindings → initialize → registry append / vhost merge
//!
//! replace:
//!     backup → stop all → clear → initialize → health check → (rollback)
//!
//! stop:
//!     remove vhost → last one out stops the listener → registry remove
//! ```

pub mod engine;
pub mod health;
pub mod signals;

use std::time::Duration;

pub use engine::{Engine, InitializeError, LifecycleError, StopOutcome};

/// How long connections may stay open after a shutdown begins.
pub const SHUTDOWN_CUTOFF: Duration = Duration::from_secs(3);

/// Upper bound on waiting for a new listener's socket before probing it.
pub const HEALTH_CHECK_DELAY: Duration = Duration::from_millis(750);

/// How long a create request waits for new listeners before settling for
/// "accepted".
pub const STARTUP_WAIT: Duration = Duration::from_millis(1500);

/// Tunables for the engine; tests shrink the windows.
#[derive(Debug, Clone)]
pub struct Options {
    pub shutdown_cutoff: Duration,
    pub health_check_delay: Duration,
    pub startup_wait: Duration,
    pub default_port: u16,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            shutdown_cutoff: SHUTDOWN_CUTOFF,
            health_check_delay: HEALTH_CHECK_DELAY,
            startup_wait: STARTUP_WAIT,
            default_port: crate::config::DEFAULT_PORT,
        }
    }
}
