//! Graceful Shutdown Handling
//!
//! Waits for SIGTERM/SIGINT (or for every TNC connection to end on its own)
//! and then shuts the connection pool down within a bounded time.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::pool::ConnectionPool;
use crate::Result;

/// Interval at which the pool is checked for remaining live connections
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Why the service is shutting down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal,
    AllConnectionsEnded,
}

/// Shutdown coordinator that manages graceful shutdown process
pub struct ShutdownCoordinator {
    /// Broadcast sender for shutdown signal
    shutdown_tx: broadcast::Sender<()>,
    /// Bound on the pool cleanup join phase
    timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shutdown_tx,
            timeout,
        }
    }

    /// Get a shutdown receiver for components to listen for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Notify every subscriber that shutdown has begun
    pub fn trigger(&self) {
        if self.shutdown_tx.send(()).is_err() {
            debug!("No components subscribed to the shutdown signal");
        }
    }

    /// Wait for a shutdown signal (SIGTERM, SIGINT)
    pub async fn wait_for_signal(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
            }
        }

        #[cfg(windows)]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        Ok(())
    }

    /// Resolve once no connection in the pool has a running worker
    pub async fn wait_until_idle(&self, pool: &ConnectionPool) {
        let mut last_count = pool.active_count();

        while last_count > 0 {
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;

            let current_count = pool.active_count();
            if current_count != last_count {
                debug!("Active TNC connections: {} -> {}", last_count, current_count);
                last_count = current_count;
            }
        }
    }

    /// Wait for a signal or for every connection to end, whichever comes first,
    /// then broadcast shutdown to subscribers
    pub async fn wait_for_shutdown(&self, pool: &ConnectionPool) -> ShutdownReason {
        let reason = tokio::select! {
            result = self.wait_for_signal() => {
                if let Err(e) = result {
                    error!("Error setting up signal handlers: {}", e);
                }
                ShutdownReason::Signal
            }
            _ = self.wait_until_idle(pool) => {
                warn!("All TNC connections have ended");
                ShutdownReason::AllConnectionsEnded
            }
        };

        self.trigger();
        reason
    }

    /// Stop every connection and wait for the workers, bounded by the timeout
    pub async fn shutdown_pool(&self, pool: &ConnectionPool) {
        info!(
            "Shutting down {} TNC connections (timeout: {:?})",
            pool.active_count(),
            self.timeout
        );
        let start_time = Instant::now();

        pool.cleanup_with_timeout(self.timeout).await;

        info!("TNC connections shut down in {:?}", start_time.elapsed());
    }
}

/// Periodically logs a snapshot of the pool until shutdown is broadcast
pub struct StatusReporter {
    handle: tokio::task::JoinHandle<()>,
}

impl StatusReporter {
    /// Spawn the reporter task
    pub fn spawn(coordinator: &ShutdownCoordinator, pool: Arc<ConnectionPool>, interval: Duration) -> Self {
        let mut shutdown_rx = coordinator.subscribe();

        let handle = tokio::spawn(async move {
            debug!("Starting TNC status reporter (interval: {:?})", interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for info in pool.snapshot() {
                            info!(
                                name = %info.name,
                                endpoint = %info.endpoint,
                                state = %info.state,
                                running = info.running,
                                retry_attempts = info.retry_attempts,
                                "TNC connection status"
                            );
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Status reporter received shutdown signal");
                        break;
                    }
                }
            }
        });

        Self { handle }
    }

    /// Wait for the reporter to exit
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            if !e.is_cancelled() {
                error!("Status reporter failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal_broadcast() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let mut receiver = coordinator.subscribe();

        coordinator.trigger();

        assert!(receiver.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_pool_is_idle() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let pool = ConnectionPool::new();

        let reason = tokio::time::timeout(Duration::from_secs(1), coordinator.wait_for_shutdown(&pool))
            .await
            .expect("empty pool should be idle immediately");
        assert_eq!(reason, ShutdownReason::AllConnectionsEnded);
    }

    #[tokio::test]
    async fn test_status_reporter_stops_on_shutdown() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let pool = Arc::new(ConnectionPool::new());

        let reporter = StatusReporter::spawn(&coordinator, pool, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        coordinator.trigger();

        tokio::time::timeout(Duration::from_secs(1), reporter.join())
            .await
            .expect("reporter should exit after shutdown");
    }
}
