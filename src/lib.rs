//! tncpool Library
//!
//! Connection pool for KISS Terminal Node Controllers.
//!
//! Each named connection runs its own background worker that opens the link
//! to a TNC (retrying refused connections with a fixed delay), reads decoded
//! frames, and hands them to a registered callback. The pool keeps at most
//! one live worker per name and shuts all of them down together.

pub mod config;
pub mod connection;
pub mod error;
pub mod frame_log;
pub mod kiss;
pub mod pool;
pub mod shutdown;
pub mod transport;

pub use config::{Config, SpecSchema};
pub use connection::{ConnectionSpec, ConnectionState, FrameCallback};
pub use error::{ConfigurationError, ConnectError, PoolError, SessionError};
pub use kiss::Frame;
pub use pool::{ConnectOutcome, ConnectionPool};
pub use shutdown::ShutdownCoordinator;

/// Common error type for application-level code
pub type Result<T> = anyhow::Result<T>;
