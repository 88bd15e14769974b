//! Graceful shutdown coordinator.
//!
//! On SIGTERM or Ctrl-C the stop token is cancelled: the HTTP listener stops
//! accepting, every signaling connection leaves its read loop and releases
//! its registration, and shutdown waits (bounded) for those connections to
//! finish.
//!
//! Uses `CancellationToken` for coordination and `ConnectionGuard` for drain tracking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Held by each open signaling connection; dropping it marks the
/// connection as drained.
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let prev = self.counter.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            self.notify.notify_waiters();
        }
    }
}

/// Coordinator for graceful shutdown with connection draining.
#[derive(Clone)]
pub struct GracefulShutdown {
    /// Cancelled when the server should stop
    stop: CancellationToken,
    /// Open connection counter
    connection_count: Arc<AtomicUsize>,
    /// Notified when the last connection drains
    drain_notify: Arc<Notify>,
    drain_timeout: Duration,
}

impl GracefulShutdown {
    pub fn new(drain_timeout: Duration) -> Self {
        Self {
            stop: CancellationToken::new(),
            connection_count: Arc::new(AtomicUsize::new(0)),
            drain_notify: Arc::new(Notify::new()),
            drain_timeout,
        }
    }

    /// Token cancelled when the server should stop.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Track a newly opened connection until the guard is dropped.
    pub fn connection_guard(&self) -> ConnectionGuard {
        self.connection_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            counter: Arc::clone(&self.connection_count),
            notify: Arc::clone(&self.drain_notify),
        }
    }

    /// Number of connections that have not finished closing.
    pub fn active_connections(&self) -> usize {
        self.connection_count.load(Ordering::SeqCst)
    }

    /// Cancel the stop token.
    pub fn trigger_stop(&self) {
        self.stop.cancel();
    }

    /// Wait for SIGTERM or Ctrl-C, then cancel the stop token.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to register SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl-C, initiating graceful shutdown"),
            _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = self.stop.cancelled() => return,
        }

        self.trigger_stop();
    }

    /// Wait for all connections to close or the drain timeout to expire.
    ///
    /// Returns `true` if every connection drained.
    pub async fn drain(&self) -> bool {
        let active = self.active_connections();
        if active == 0 {
            info!("No active connections, drain complete");
            return true;
        }

        info!(
            active_connections = active,
            timeout_secs = self.drain_timeout.as_secs(),
            "Draining active connections"
        );

        tokio::select! {
            _ = self.wait_for_drain() => {
                info!("All connections drained cleanly");
                true
            }
            _ = tokio::time::sleep(self.drain_timeout) => {
                warn!(
                    remaining_connections = self.active_connections(),
                    timeout_secs = self.drain_timeout.as_secs(),
                    "Drain timeout expired"
                );
                false
            }
        }
    }

    async fn wait_for_drain(&self) {
        loop {
            let notified = self.drain_notify.notified();
            if self.connection_count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}
