//! KISS over TCP

use std::future::Future;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use super::{read_kiss_stream, InterruptSignal, ReadInterrupter, Transport};
use crate::error::{ConnectError, SessionError};
use crate::kiss::{Frame, KissDecoder};

/// TCP link to a KISS TNC (e.g. a soundmodem or Dire Wolf KISS port)
pub struct TcpKissTransport {
    name: String,
    host: String,
    port: u16,
    stream: Option<TcpStream>,
    decoder: KissDecoder,
    interrupter: ReadInterrupter,
    signal: InterruptSignal,
}

impl TcpKissTransport {
    /// Create a transport for `host:port`. Nothing is opened yet.
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        let (interrupter, signal) = ReadInterrupter::pair();

        Self {
            name: name.into(),
            host: host.into(),
            port,
            stream: None,
            decoder: KissDecoder::new(),
            interrupter,
            signal,
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Transport for TcpKissTransport {
    fn open(&mut self) -> impl Future<Output = Result<(), ConnectError>> + Send {
        async move {
            debug!("Connecting TNC {} to {}:{}", self.name, self.host, self.port);

            let stream = TcpStream::connect((self.host.as_str(), self.port))
                .await
                .map_err(ConnectError::from_io)?;

            if let Err(e) = stream.set_nodelay(true) {
                debug!("Could not set TCP_NODELAY for TNC {}: {}", self.name, e);
            }

            self.decoder.reset();
            self.stream = Some(stream);
            Ok(())
        }
    }

    fn read<F>(&mut self, on_frame: F) -> impl Future<Output = Result<(), SessionError>> + Send
    where
        F: FnMut(Frame) -> Result<(), SessionError> + Send,
    {
        async move {
            let stream = self.stream.as_mut().ok_or_else(|| {
                SessionError::TransportRead(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "transport is not open",
                ))
            })?;

            read_kiss_stream(&self.name, stream, &mut self.decoder, &mut self.signal, on_frame).await
        }
    }

    fn close(&mut self) -> impl Future<Output = ()> + Send {
        async move {
            if let Some(mut stream) = self.stream.take() {
                if let Err(e) = stream.shutdown().await {
                    debug!("Error closing TCP link of TNC {}: {}", self.name, e);
                }
                debug!("Closed TCP link of TNC {}", self.name);
            }
        }
    }

    fn interrupter(&self) -> ReadInterrupter {
        self.interrupter.clone()
    }
}
