//! KISS Connections

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::worker::{run_connection, Connection, FrameCallback, WorkerCore, WorkerExit};
use super::{ConnectionSpec, ConnectionState, Endpoint};
use crate::transport::{ReadInterrupter, TcpKissTransport, Transport};

#[cfg(feature = "serial")]
use crate::transport::SerialKissTransport;

/// A TNC connection speaking KISS over transport `T`
pub struct KissConnection<T: Transport> {
    core: Arc<WorkerCore>,
    spec: ConnectionSpec,
    callback: FrameCallback,
    interrupter: ReadInterrupter,
    transport: Mutex<Option<T>>,
}

impl KissConnection<TcpKissTransport> {
    /// KISS over TCP. Returns `None` if the spec does not describe a TCP endpoint.
    pub fn tcp(name: &str, spec: ConnectionSpec, callback: FrameCallback) -> Option<Self> {
        let transport = match spec.endpoint() {
            Endpoint::Tcp { host, port } => TcpKissTransport::new(name, host.clone(), *port),
            Endpoint::Serial { .. } => return None,
        };
        Some(Self::with_transport(name, spec, transport, callback))
    }
}

#[cfg(feature = "serial")]
impl KissConnection<SerialKissTransport> {
    /// KISS over a serial line. Returns `None` if the spec does not describe a serial endpoint.
    pub fn serial(name: &str, spec: ConnectionSpec, callback: FrameCallback) -> Option<Self> {
        let transport = match spec.endpoint() {
            Endpoint::Serial { device, baud_rate } => {
                SerialKissTransport::new(name, device.clone(), *baud_rate)
            }
            Endpoint::Tcp { .. } => return None,
        };
        Some(Self::with_transport(name, spec, transport, callback))
    }
}

impl<T: Transport> KissConnection<T> {
    /// Build a connection around an already constructed transport
    pub fn with_transport(name: &str, spec: ConnectionSpec, transport: T, callback: FrameCallback) -> Self {
        let interrupter = transport.interrupter();

        Self {
            core: Arc::new(WorkerCore::new(name)),
            spec,
            callback,
            interrupter,
            transport: Mutex::new(Some(transport)),
        }
    }
}

impl<T: Transport> Connection for KissConnection<T> {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn spec(&self) -> &ConnectionSpec {
        &self.spec
    }

    fn start(&self, runtime: &Handle) {
        let Some(transport) = self.transport.lock().take() else {
            warn!("TNC {} was already started", self.name());
            return;
        };

        let task = run_connection(
            Arc::clone(&self.core),
            self.spec.clone(),
            transport,
            self.callback.clone(),
        );

        if self.core.spawn(runtime, task) {
            debug!("Started worker for TNC {}", self.name());
        }
    }

    fn stop(&self) {
        if !self.core.request_stop() {
            debug!("Stop for TNC {} ignored (not started or already stopping)", self.name());
            return;
        }

        info!("Stopping TNC connection {}", self.name());
        self.interrupter.interrupt();
    }

    fn status(&self) -> ConnectionState {
        self.core.state()
    }

    fn is_running(&self) -> bool {
        self.core.is_running()
    }

    fn retry_attempts(&self) -> u32 {
        self.core.retry_attempts()
    }

    fn exit_signal(&self) -> WorkerExit {
        self.core.exit_signal()
    }

    fn abort(&self) {
        self.core.abort();
    }
}
