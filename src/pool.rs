//! TNC Connection Pool
//!
//! Registry of named TNC connections. Guarantees at most one live worker per
//! name and coordinates shutdown of all of them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::connection::{
    Connection, ConnectionFactory, ConnectionSpec, ConnectionState, DefaultConnectionFactory,
    FrameCallback, WorkerExit,
};
use crate::error::PoolError;

/// Result of `ConnectionPool::connect`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new worker was created and started
    Started,
    /// A live worker already exists under that name; nothing was changed
    AlreadyRunning,
}

/// Point-in-time view of one registered connection
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub name: String,
    pub endpoint: String,
    pub state: ConnectionState,
    pub running: bool,
    pub retry_attempts: u32,
}

/// Pool of named TNC connections
pub struct ConnectionPool {
    connections: Mutex<HashMap<String, Arc<dyn Connection>>>,
    factory: Arc<dyn ConnectionFactory>,
    runtime: Handle,
}

impl ConnectionPool {
    /// Create a pool using the default connection variants.
    ///
    /// Workers are spawned on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new() -> Self {
        Self::with_factory(Arc::new(DefaultConnectionFactory), Handle::current())
    }

    /// Create a pool with a custom factory and runtime
    pub fn with_factory(factory: Arc<dyn ConnectionFactory>, runtime: Handle) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            factory,
            runtime,
        }
    }

    /// Create and start a connection under `name`.
    ///
    /// If a live connection is already registered under `name` it is left
    /// untouched. A registered connection that has finished is replaced.
    pub fn connect(
        &self,
        name: &str,
        spec: ConnectionSpec,
        callback: FrameCallback,
    ) -> Result<ConnectOutcome, PoolError> {
        if !callback.is_invocable() {
            return Err(PoolError::InvalidCallback(name.to_string()));
        }

        let mut connections = self.connections.lock();

        if let Some(existing) = connections.get(name) {
            if existing.is_running() {
                info!("Tried to start TNC connection {}, but it's already running", name);
                return Ok(ConnectOutcome::AlreadyRunning);
            }
            debug!("Replacing finished TNC connection {}", name);
        }

        let connection = self.factory.create(name, spec, callback)?;
        connection.start(&self.runtime);
        info!("Started TNC connection {} to {}", name, connection.spec().endpoint());
        connections.insert(name.to_string(), connection);

        Ok(ConnectOutcome::Started)
    }

    /// Signal the named connection to stop. Does not wait for it to exit.
    pub fn stop(&self, name: &str) -> Result<(), PoolError> {
        let connections = self.connections.lock();
        let connection = connections
            .get(name)
            .ok_or_else(|| PoolError::NotFound(name.to_string()))?;

        connection.stop();
        Ok(())
    }

    /// Current lifecycle state of the named connection
    pub fn status(&self, name: &str) -> Result<ConnectionState, PoolError> {
        // Registry lock covers the lookup only; the read takes the connection lock
        let connection = self.get(name)?;
        Ok(connection.status())
    }

    /// Whether the named connection's worker is still running
    pub fn is_running(&self, name: &str) -> Result<bool, PoolError> {
        Ok(self.get(name)?.is_running())
    }

    /// Names of all registered connections
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of every registered connection, sorted by name
    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        let connections: Vec<(String, Arc<dyn Connection>)> = self
            .connections
            .lock()
            .iter()
            .map(|(name, conn)| (name.clone(), Arc::clone(conn)))
            .collect();

        let mut infos: Vec<ConnectionInfo> = connections
            .into_iter()
            .map(|(name, conn)| ConnectionInfo {
                name,
                endpoint: conn.spec().endpoint().to_string(),
                state: conn.status(),
                running: conn.is_running(),
                retry_attempts: conn.retry_attempts(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Number of registered connections whose worker is still running
    pub fn active_count(&self) -> usize {
        self.connections
            .lock()
            .values()
            .filter(|conn| conn.is_running())
            .count()
    }

    /// Wait until the named connection's worker has exited.
    ///
    /// Cancelling this wait leaves the worker and any other waiter untouched.
    pub async fn join(&self, name: &str) -> Result<(), PoolError> {
        let exit = self.get(name)?.exit_signal();
        exit.wait().await;
        Ok(())
    }

    /// Stop every connection, wait for all workers to exit, and clear the registry
    pub async fn cleanup(&self) {
        debug!("Cleaning up all TNC connections");
        let workers = self.signal_all();

        for (_, exit) in workers {
            exit.wait().await;
        }

        info!("All TNC connections cleaned up");
    }

    /// Like `cleanup`, but aborts workers still running after `timeout`
    pub async fn cleanup_with_timeout(&self, timeout: Duration) {
        debug!("Cleaning up all TNC connections (timeout: {:?})", timeout);
        let start_time = Instant::now();
        let workers = self.signal_all();

        for (connection, exit) in workers {
            let remaining = timeout.saturating_sub(start_time.elapsed());
            if tokio::time::timeout(remaining, exit.clone().wait()).await.is_err() {
                warn!(
                    "TNC {} did not stop within {:?}, aborting its worker",
                    connection.name(),
                    timeout
                );
                connection.abort();
                exit.wait().await;
            }
        }

        info!("All TNC connections cleaned up in {:?}", start_time.elapsed());
    }

    /// Phase one of shutdown: signal every worker under the registry lock and
    /// drain the registry. Waiting happens afterwards, outside the lock.
    fn signal_all(&self) -> Vec<(Arc<dyn Connection>, WorkerExit)> {
        let mut connections = self.connections.lock();

        for connection in connections.values() {
            connection.stop();
        }

        connections
            .drain()
            .map(|(_, conn)| {
                let exit = conn.exit_signal();
                (conn, exit)
            })
            .collect()
    }

    fn get(&self, name: &str) -> Result<Arc<dyn Connection>, PoolError> {
        self.connections
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| PoolError::NotFound(name.to_string()))
    }
}
