//! Frame Logger
//!
//! Appends one human-readable line per received frame to a log file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;

use crate::connection::FrameCallback;
use crate::kiss::Frame;
use crate::Result;

/// Writes received frames to a file.
///
/// Shared between connections, so writes are serialised internally.
#[derive(Debug)]
pub struct FrameLogger {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FrameLogger {
    /// Open `path` for appending, creating it if needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open frame log: {}", path.display()))?;

        tracing::info!("Logging received frames to {}", path.display());
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format a frame as a single log line
    pub fn format_frame(connection: &str, frame: &Frame) -> String {
        format!(
            "Timestamp: {}; TNC: {}; Port: {}; Command: {}; Data: {};",
            humantime::format_rfc3339_millis(frame.received_at),
            connection,
            frame.port,
            frame.command,
            frame.payload_hex()
        )
    }

    /// Append a frame and flush.
    ///
    /// Blocking file I/O under the writer lock. Called from a connection's
    /// task, so a slow disk stalls that connection's reads for the duration
    /// of the write.
    pub fn log_frame(&self, connection: &str, frame: &Frame) -> Result<()> {
        let line = Self::format_frame(connection, frame);
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)
            .and_then(|_| writer.flush())
            .with_context(|| format!("Failed to write frame log: {}", self.path.display()))
    }

    /// Callback that logs every frame of connection `name` to this file.
    /// Each invocation performs a blocking `log_frame`.
    pub fn callback(self: &Arc<Self>, name: &str) -> FrameCallback {
        let logger = Arc::clone(self);
        let name = name.to_string();
        FrameCallback::new(move |frame| logger.log_frame(&name, &frame))
    }
}
