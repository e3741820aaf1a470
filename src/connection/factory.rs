//! Connection Factory
//!
//! Picks the connection variant for a (transport, protocol) pair.

use std::sync::Arc;

use super::worker::{Connection, FrameCallback};
use super::{ConnectionSpec, KissConnection, Protocol, TransportType};
use crate::error::PoolError;

/// Builds unstarted connections for the pool
pub trait ConnectionFactory: Send + Sync {
    fn create(
        &self,
        name: &str,
        spec: ConnectionSpec,
        callback: FrameCallback,
    ) -> Result<Arc<dyn Connection>, PoolError>;
}

/// Factory for the transports compiled into this build
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConnectionFactory;

impl ConnectionFactory for DefaultConnectionFactory {
    fn create(
        &self,
        name: &str,
        spec: ConnectionSpec,
        callback: FrameCallback,
    ) -> Result<Arc<dyn Connection>, PoolError> {
        let (transport, protocol) = (spec.transport(), spec.protocol());
        let unsupported = PoolError::Unsupported { transport, protocol };

        match (transport, protocol) {
            (TransportType::Tcpip, Protocol::Kiss) => KissConnection::tcp(name, spec, callback)
                .map(|conn| Arc::new(conn) as Arc<dyn Connection>)
                .ok_or(unsupported),

            #[cfg(feature = "serial")]
            (TransportType::Serial, Protocol::Kiss) => KissConnection::serial(name, spec, callback)
                .map(|conn| Arc::new(conn) as Arc<dyn Connection>)
                .ok_or(unsupported),

            #[cfg(not(feature = "serial"))]
            (TransportType::Serial, Protocol::Kiss) => Err(unsupported),
        }
    }
}
