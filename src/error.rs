//! Error Types
//!
//! Typed failures raised by the pool, the connection workers and the
//! transports. Application code wraps these in `anyhow` at the edges.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::connection::{Protocol, TransportType};

/// Invalid connection specification. Raised while building a `ConnectionSpec`
/// and never once a connection has been handed to the pool.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("connection name must not be empty")]
    EmptyName,

    #[error("retry limit must be >= 0, got {0}")]
    NegativeRetryLimit(i64),

    #[error("retry limit {value} exceeds the maximum of {max}")]
    RetryLimitTooLarge { value: i64, max: u32 },

    #[error("retry delay {value:?} exceeds the maximum of {max:?}")]
    RetryDelayTooLarge { value: Duration, max: Duration },

    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("invalid {transport} endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        transport: TransportType,
        endpoint: String,
        reason: String,
    },

    #[error("unsupported transport/protocol pair {transport}/{protocol}")]
    UnsupportedPair {
        transport: TransportType,
        protocol: Protocol,
    },
}

/// Misuse of the pool API, reported synchronously to the caller.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("callback for connection '{0}' cannot be invoked")]
    InvalidCallback(String),

    #[error("no TNC connection with name '{0}'")]
    NotFound(String),

    #[error("{transport}/{protocol} connections are not available in this build")]
    Unsupported {
        transport: TransportType,
        protocol: Protocol,
    },
}

/// Failure while opening a transport.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The peer refused the connection. This is the only retried class.
    #[error("connection refused: {0}")]
    Refused(#[source] io::Error),

    #[error("failed to open transport: {0}")]
    Fatal(#[source] io::Error),

    #[error("gave up after {attempts} connection attempts")]
    RetriesExhausted { attempts: u32 },
}

impl ConnectError {
    /// Classify an I/O error from a connect call.
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ConnectError::Refused(err),
            _ => ConnectError::Fatal(err),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, ConnectError::Refused(_))
    }
}

/// Failure inside an established read session. Fatal to that connection only.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport read failed: {0}")]
    TransportRead(#[from] io::Error),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("frame callback failed: {0}")]
    Callback(#[source] anyhow::Error),
}
