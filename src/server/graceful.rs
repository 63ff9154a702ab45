//! Graceful listener lifecycle.
//!
//! # Responsibilities
//! - Serve one bound address, plain or TLS, until stopped
//! - Expose a listening signal (the health-check gate) and a stop-complete
//!   signal
//! - Drain in-flight connections up to a timeout on stop, then force-close
//! - Run an optional shutdown callback before the listener closes
//!
//! Each call to [`Graceful::serve`] opens a fresh session (the rollback path
//! restarts servers), so stop idempotence and the completion signal are
//! per-session. Accept/drain mechanics, idle-connection closure during the
//! drain, and the handling of upgraded connections are delegated to the
//! serving stack; this type owns the control surface.

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

type ShutdownCallback = Box<dyn Fn() + Send + Sync>;

pub struct Graceful {
    /// Drain window applied when a stop does not specify one; an explicit
    /// stop overrides it for that stop and onward.
    drain_timeout: Mutex<Duration>,
    callback: Mutex<Option<ShutdownCallback>>,
    session: Mutex<Option<Arc<Session>>>,
    /// A stop arrived before the serve task opened its session; the next
    /// serve consumes it and exits without binding.
    pre_stop: AtomicBool,
}

struct Session {
    handle: Handle,
    stop_requested: AtomicBool,
    stopped: watch::Sender<bool>,
}

impl Graceful {
    pub fn new(drain_timeout: Duration) -> Self {
        Self {
            drain_timeout: Mutex::new(drain_timeout),
            callback: Mutex::new(None),
            session: Mutex::new(None),
            pre_stop: AtomicBool::new(false),
        }
    }

    /// Register a callback to run when shutdown begins, before the listener
    /// closes. Used to give long-lived clients a chance to reconnect.
    pub fn on_shutdown(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.callback.lock() = Some(Box::new(callback));
    }

    /// Serve `app` on `addr` until stopped. Blocks for the whole session,
    /// including the drain, and resolves the stop-complete signal on return.
    pub async fn serve(
        &self,
        addr: SocketAddr,
        app: Router,
        tls: Option<RustlsConfig>,
    ) -> std::io::Result<()> {
        let session = {
            let mut current = self.session.lock();
            if self.pre_stop.swap(false, Ordering::SeqCst) {
                // Stopped before we ever bound; nothing to serve.
                return Ok(());
            }
            let session = Arc::new(Session {
                handle: Handle::new(),
                stop_requested: AtomicBool::new(false),
                stopped: watch::channel(false).0,
            });
            *current = Some(session.clone());
            session
        };
        let handle = session.handle.clone();

        let result = match tls {
            Some(config) => {
                axum_server::bind_rustls(addr, config)
                    .handle(handle)
                    .serve(app.into_make_service())
                    .await
            }
            None => axum_server::bind(addr).handle(handle).serve(app.into_make_service()).await,
        };

        let _ = session.stopped.send(true);
        let mut current = self.session.lock();
        if current.as_ref().is_some_and(|s| Arc::ptr_eq(s, &session)) {
            *current = None;
        }
        result
    }

    /// Request shutdown with the given drain window. In-flight requests get
    /// up to `timeout` to finish before their connections are force-closed;
    /// zero tears down immediately. Idempotent per session: a repeated stop
    /// does nothing, and callers observe completion via [`wait_stopped`].
    ///
    /// [`wait_stopped`]: Graceful::wait_stopped
    pub fn stop(&self, timeout: Duration) {
        *self.drain_timeout.lock() = timeout;
        let session = {
            let current = self.session.lock();
            match &*current {
                Some(session) => session.clone(),
                None => {
                    // The serve task has not opened its session yet (or
                    // never will); make the stop stick.
                    self.pre_stop.store(true, Ordering::SeqCst);
                    return;
                }
            }
        };
        if session.stop_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(callback) = &*self.callback.lock() {
            callback();
        }
        session.handle.graceful_shutdown(Some(*self.drain_timeout.lock()));
    }

    /// Resolve once the current session has fully stopped. Resolves
    /// immediately when no session is active.
    pub async fn wait_stopped(&self) {
        let session = self.session.lock().clone();
        let Some(session) = session else { return };
        let mut rx = session.stopped.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait up to `cap` for the listener to be bound and accepting. Also
    /// waits out the gap between spawning a serve task and that task
    /// opening its session.
    pub async fn wait_listening(&self, cap: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + cap;
        loop {
            let session = self.session.lock().clone();
            if let Some(session) = session {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                return matches!(
                    tokio::time::timeout(remaining, session.handle.listening()).await,
                    Ok(Some(_))
                );
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Number of connections currently tracked by the active session.
    pub fn connection_count(&self) -> usize {
        self.session.lock().as_ref().map(|s| s.handle.connection_count()).unwrap_or(0)
    }
}

/// Whether a serve error is expected fallout of a stop rather than a real
/// failure. Bind errors (address in use, permission denied) are never
/// ignorable.
pub fn is_ignorable(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::NotConnected
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    fn app() -> Router {
        Router::new().route("/", get(|| async { "ok" }))
    }

    fn free_addr() -> SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    #[tokio::test]
    async fn serve_signals_listening_and_stop_completes() {
        let graceful = Arc::new(Graceful::new(Duration::from_secs(1)));
        let addr = free_addr();

        let serving = {
            let graceful = graceful.clone();
            tokio::spawn(async move { graceful.serve(addr, app(), None).await })
        };

        assert!(graceful.wait_listening(Duration::from_secs(2)).await);
        graceful.stop(Duration::from_millis(100));
        graceful.wait_stopped().await;

        serving.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let graceful = Arc::new(Graceful::new(Duration::from_secs(1)));
        let addr = free_addr();

        let serving = {
            let graceful = graceful.clone();
            tokio::spawn(async move { graceful.serve(addr, app(), None).await })
        };
        assert!(graceful.wait_listening(Duration::from_secs(2)).await);

        graceful.stop(Duration::ZERO);
        graceful.stop(Duration::ZERO);
        graceful.wait_stopped().await;
        graceful.wait_stopped().await;

        serving.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_callback_runs_before_completion() {
        let graceful = Arc::new(Graceful::new(Duration::from_secs(1)));
        let fired = Arc::new(AtomicBool::new(false));
        {
            let fired = fired.clone();
            graceful.on_shutdown(move || {
                fired.store(true, Ordering::SeqCst);
            });
        }
        let addr = free_addr();

        let serving = {
            let graceful = graceful.clone();
            tokio::spawn(async move { graceful.serve(addr, app(), None).await })
        };
        assert!(graceful.wait_listening(Duration::from_secs(2)).await);

        graceful.stop(Duration::from_millis(100));
        graceful.wait_stopped().await;
        assert!(fired.load(Ordering::SeqCst));

        serving.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bind_failure_propagates() {
        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = holder.local_addr().unwrap();

        let graceful = Graceful::new(Duration::from_secs(1));
        let result = graceful.serve(addr, app(), None).await;
        assert!(result.is_err());
        assert!(!is_ignorable(&result.unwrap_err()));
    }

    #[tokio::test]
    async fn stop_before_serve_sticks() {
        let graceful = Graceful::new(Duration::from_secs(1));
        graceful.stop(Duration::ZERO);
        graceful.wait_stopped().await;
        assert!(!graceful.wait_listening(Duration::from_millis(10)).await);

        // The pending stop makes the next serve exit without binding.
        let addr = free_addr();
        graceful.serve(addr, app(), None).await.unwrap();
        assert!(std::net::TcpListener::bind(addr).is_ok());
    }
}
