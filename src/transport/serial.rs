//! KISS over a serial line

use std::future::Future;
use std::io;
use std::path::PathBuf;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

use super::{read_kiss_stream, InterruptSignal, ReadInterrupter, Transport};
use crate::error::{ConnectError, SessionError};
use crate::kiss::{Frame, KissDecoder};

/// Serial (RS-232/USB) link to a hardware KISS TNC. 8N1, no flow control.
pub struct SerialKissTransport {
    name: String,
    device: PathBuf,
    baud_rate: u32,
    port: Option<SerialStream>,
    decoder: KissDecoder,
    interrupter: ReadInterrupter,
    signal: InterruptSignal,
}

impl SerialKissTransport {
    pub fn new(name: impl Into<String>, device: impl Into<PathBuf>, baud_rate: u32) -> Self {
        let (interrupter, signal) = ReadInterrupter::pair();

        Self {
            name: name.into(),
            device: device.into(),
            baud_rate,
            port: None,
            decoder: KissDecoder::new(),
            interrupter,
            signal,
        }
    }
}

/// A missing device is the serial analogue of a refused connection: the TNC
/// may simply not be plugged in yet.
fn classify(err: tokio_serial::Error) -> ConnectError {
    match err.kind() {
        tokio_serial::ErrorKind::NoDevice | tokio_serial::ErrorKind::Io(io::ErrorKind::NotFound) => {
            ConnectError::Refused(io::Error::new(io::ErrorKind::NotFound, err.to_string()))
        }
        tokio_serial::ErrorKind::Io(kind) => ConnectError::Fatal(io::Error::new(kind, err.to_string())),
        _ => ConnectError::Fatal(io::Error::new(io::ErrorKind::Other, err.to_string())),
    }
}

impl Transport for SerialKissTransport {
    fn open(&mut self) -> impl Future<Output = Result<(), ConnectError>> + Send {
        async move {
            debug!(
                "Opening serial TNC {} on {} at {} baud",
                self.name,
                self.device.display(),
                self.baud_rate
            );

            let port = tokio_serial::new(self.device.to_string_lossy(), self.baud_rate)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .open_native_async()
                .map_err(classify)?;

            self.decoder.reset();
            self.port = Some(port);
            Ok(())
        }
    }

    fn read<F>(&mut self, on_frame: F) -> impl Future<Output = Result<(), SessionError>> + Send
    where
        F: FnMut(Frame) -> Result<(), SessionError> + Send,
    {
        async move {
            let port = self.port.as_mut().ok_or_else(|| {
                SessionError::TransportRead(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "serial port is not open",
                ))
            })?;

            read_kiss_stream(&self.name, port, &mut self.decoder, &mut self.signal, on_frame).await
        }
    }

    fn close(&mut self) -> impl Future<Output = ()> + Send {
        async move {
            if self.port.take().is_some() {
                debug!("Closed serial port of TNC {}", self.name);
            }
        }
    }

    fn interrupter(&self) -> ReadInterrupter {
        self.interrupter.clone()
    }
}
