//! Transport Layer
//!
//! Byte links to a TNC. A transport opens the link, blocks in `read` while it
//! delivers decoded frames, and can be forced out of that read from any other
//! task through its `ReadInterrupter`. Reads are not polled for cancellation:
//! the interrupter is the only way to unblock them.

pub mod tcp;

#[cfg(feature = "serial")]
pub mod serial;

use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tracing::debug;

use crate::error::{ConnectError, SessionError};
use crate::kiss::{Frame, KissDecoder};

pub use tcp::TcpKissTransport;

#[cfg(feature = "serial")]
pub use serial::SerialKissTransport;

/// Read buffer size for KISS byte streams
pub const READ_BUFFER_SIZE: usize = 1024;

/// A link to a TNC
pub trait Transport: Send + 'static {
    /// Open the link. A refused connection is reported as `ConnectError::Refused`.
    fn open(&mut self) -> impl Future<Output = Result<(), ConnectError>> + Send;

    /// Read frames until interrupted, invoking `on_frame` for each one.
    ///
    /// Returns `Ok(())` when the read was interrupted and an error when the
    /// link failed, the peer went away, or `on_frame` failed.
    fn read<F>(&mut self, on_frame: F) -> impl Future<Output = Result<(), SessionError>> + Send
    where
        F: FnMut(Frame) -> Result<(), SessionError> + Send;

    /// Release the link. Safe to call repeatedly.
    fn close(&mut self) -> impl Future<Output = ()> + Send;

    /// Handle that forces a blocked `read` to return
    fn interrupter(&self) -> ReadInterrupter;
}

/// Thread-safe, idempotent unblocking primitive for a transport read
#[derive(Debug, Clone)]
pub struct ReadInterrupter {
    tx: Arc<watch::Sender<bool>>,
}

/// Receiving side of a `ReadInterrupter`, held by the transport
#[derive(Debug, Clone)]
pub struct InterruptSignal {
    rx: watch::Receiver<bool>,
}

impl ReadInterrupter {
    /// Create a connected interrupter/signal pair
    pub fn pair() -> (ReadInterrupter, InterruptSignal) {
        let (tx, rx) = watch::channel(false);
        (ReadInterrupter { tx: Arc::new(tx) }, InterruptSignal { rx })
    }

    /// Unblock the read. Later reads return immediately as well.
    pub fn interrupt(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_interrupted(&self) -> bool {
        *self.tx.borrow()
    }
}

impl InterruptSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the paired interrupter has fired
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            // A dropped interrupter can never fire again; treat it as fired
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Read a KISS byte stream until interrupted.
///
/// Only data frames reach `on_frame`; TNC command frames are logged and skipped.
pub async fn read_kiss_stream<S, F>(
    name: &str,
    stream: &mut S,
    decoder: &mut KissDecoder,
    signal: &mut InterruptSignal,
    mut on_frame: F,
) -> Result<(), SessionError>
where
    S: AsyncRead + Unpin + Send,
    F: FnMut(Frame) -> Result<(), SessionError> + Send,
{
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        let n = tokio::select! {
            biased;
            _ = signal.triggered() => {
                debug!("Read on TNC {} interrupted", name);
                return Ok(());
            }
            result = stream.read(&mut buf) => result?,
        };

        if n == 0 {
            return Err(SessionError::PeerClosed);
        }

        for frame in decoder.decode(&buf[..n]) {
            if !frame.is_data() {
                debug!(
                    "TNC {} sent non-data KISS frame (command 0x{:02x}), skipping",
                    name, frame.command
                );
                continue;
            }
            on_frame(frame)?;
        }
    }
}
