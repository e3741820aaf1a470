//! Connection Validation Schema
//!
//! The limits every `ConnectionSpec` is checked against. A schema is built once
//! at startup and passed by reference to whatever performs validation.

use std::collections::HashSet;
use std::time::Duration;

use crate::connection::{Protocol, TransportType};

/// Immutable validation table for connection specifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSchema {
    max_retry_limit: u32,
    max_retry_delay: Duration,
    default_baud_rate: u32,
    supported: HashSet<(TransportType, Protocol)>,
}

impl SpecSchema {
    /// Create a schema with explicit limits and no supported pairs
    pub fn new(max_retry_limit: u32, max_retry_delay: Duration, default_baud_rate: u32) -> Self {
        Self {
            max_retry_limit,
            max_retry_delay,
            default_baud_rate,
            supported: HashSet::new(),
        }
    }

    /// Return a copy that also accepts the given transport/protocol pair
    pub fn with_pair(mut self, transport: TransportType, protocol: Protocol) -> Self {
        self.supported.insert((transport, protocol));
        self
    }

    /// Return a copy with a different retry limit ceiling
    pub fn with_max_retry_limit(mut self, max_retry_limit: u32) -> Self {
        self.max_retry_limit = max_retry_limit;
        self
    }

    /// Return a copy with a different retry delay ceiling
    pub fn with_max_retry_delay(mut self, max_retry_delay: Duration) -> Self {
        self.max_retry_delay = max_retry_delay;
        self
    }

    pub fn max_retry_limit(&self) -> u32 {
        self.max_retry_limit
    }

    pub fn max_retry_delay(&self) -> Duration {
        self.max_retry_delay
    }

    pub fn default_baud_rate(&self) -> u32 {
        self.default_baud_rate
    }

    pub fn supports(&self, transport: TransportType, protocol: Protocol) -> bool {
        self.supported.contains(&(transport, protocol))
    }
}

impl Default for SpecSchema {
    fn default() -> Self {
        let schema = Self::new(1000, Duration::from_secs(3600), 9600)
            .with_pair(TransportType::Tcpip, Protocol::Kiss);

        if cfg!(feature = "serial") {
            schema.with_pair(TransportType::Serial, Protocol::Kiss)
        } else {
            schema
        }
    }
}
