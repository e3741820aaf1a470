//! Connection Specification

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::SpecSchema;
use crate::error::ConfigurationError;

/// Link used to reach a TNC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Tcpip,
    Serial,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Tcpip => f.write_str("TCPIP"),
            TransportType::Serial => f.write_str("SERIAL"),
        }
    }
}

/// Framing protocol spoken with the TNC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Kiss,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Kiss => f.write_str("KISS"),
        }
    }
}

/// Where the TNC lives. The shape follows the transport type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Serial { device: PathBuf, baud_rate: u32 },
}

impl Endpoint {
    /// Parse an endpoint string for the given transport.
    ///
    /// TCP endpoints are `host:port` (IPv6 hosts in brackets). Serial endpoints
    /// are `device` or `device@baud`.
    pub fn parse(
        transport: TransportType,
        raw: &str,
        schema: &SpecSchema,
    ) -> Result<Self, ConfigurationError> {
        let invalid = |reason: &str| ConfigurationError::InvalidEndpoint {
            transport,
            endpoint: raw.to_string(),
            reason: reason.to_string(),
        };

        let raw_trimmed = raw.trim();
        if raw_trimmed.is_empty() {
            return Err(invalid("endpoint is empty"));
        }

        match transport {
            TransportType::Tcpip => {
                let (host, port) = raw_trimmed
                    .rsplit_once(':')
                    .ok_or_else(|| invalid("expected host:port"))?;

                let host = host.trim_start_matches('[').trim_end_matches(']');
                if host.is_empty() {
                    return Err(invalid("host is empty"));
                }
                if host.contains(':') && !raw_trimmed.starts_with('[') {
                    return Err(invalid("IPv6 hosts must be written in brackets"));
                }

                let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;
                if port == 0 {
                    return Err(invalid("port must not be 0"));
                }

                Ok(Endpoint::Tcp {
                    host: host.to_string(),
                    port,
                })
            }
            TransportType::Serial => {
                let (device, baud_rate) = match raw_trimmed.rsplit_once('@') {
                    Some((device, baud)) => {
                        let baud: u32 = baud
                            .parse()
                            .map_err(|_| invalid("baud rate is not a number"))?;
                        (device, baud)
                    }
                    None => (raw_trimmed, schema.default_baud_rate()),
                };

                if device.is_empty() {
                    return Err(invalid("device path is empty"));
                }
                if baud_rate == 0 {
                    return Err(invalid("baud rate must not be 0"));
                }

                Ok(Endpoint::Serial {
                    device: PathBuf::from(device),
                    baud_rate,
                })
            }
        }
    }

    fn matches(&self, transport: TransportType) -> bool {
        matches!(
            (self, transport),
            (Endpoint::Tcp { .. }, TransportType::Tcpip)
                | (Endpoint::Serial { .. }, TransportType::Serial)
        )
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => write!(f, "[{}]:{}", host, port),
            Endpoint::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Serial { device, baud_rate } => {
                write!(f, "{}@{}", device.display(), baud_rate)
            }
        }
    }
}

/// Immutable description of one TNC connection and its retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    name: String,
    transport: TransportType,
    protocol: Protocol,
    endpoint: Endpoint,
    retry_limit: u32,
    retry_delay: Duration,
}

impl ConnectionSpec {
    /// Start building a specification for the named connection
    pub fn builder(name: impl Into<String>) -> ConnectionSpecBuilder {
        ConnectionSpecBuilder {
            name: name.into(),
            transport: None,
            protocol: Protocol::Kiss,
            endpoint: None,
            retry_limit: 0,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> TransportType {
        self.transport
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Additional open attempts allowed after the first refusal
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Fixed wait between open attempts
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

enum EndpointInput {
    Raw(String),
    Typed(Endpoint),
}

/// Builder for `ConnectionSpec`. All validation happens in `build`.
pub struct ConnectionSpecBuilder {
    name: String,
    transport: Option<TransportType>,
    protocol: Protocol,
    endpoint: Option<EndpointInput>,
    retry_limit: i64,
    retry_delay: Duration,
}

impl ConnectionSpecBuilder {
    pub fn transport(mut self, transport: TransportType) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Endpoint in textual form, parsed against the transport on `build`
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(EndpointInput::Raw(endpoint.into()));
        self
    }

    /// Endpoint already in typed form
    pub fn endpoint_typed(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(EndpointInput::Typed(endpoint));
        self
    }

    pub fn retry_limit(mut self, retry_limit: i64) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Validate against the default schema
    pub fn build(self) -> Result<ConnectionSpec, ConfigurationError> {
        self.build_with(&SpecSchema::default())
    }

    /// Validate against an explicit schema
    pub fn build_with(self, schema: &SpecSchema) -> Result<ConnectionSpec, ConfigurationError> {
        if self.name.trim().is_empty() {
            return Err(ConfigurationError::EmptyName);
        }

        let transport = self
            .transport
            .ok_or(ConfigurationError::MissingField("transport"))?;

        if !schema.supports(transport, self.protocol) {
            return Err(ConfigurationError::UnsupportedPair {
                transport,
                protocol: self.protocol,
            });
        }

        if self.retry_limit < 0 {
            return Err(ConfigurationError::NegativeRetryLimit(self.retry_limit));
        }
        let retry_limit = u32::try_from(self.retry_limit)
            .ok()
            .filter(|limit| *limit <= schema.max_retry_limit())
            .ok_or(ConfigurationError::RetryLimitTooLarge {
                value: self.retry_limit,
                max: schema.max_retry_limit(),
            })?;

        if self.retry_delay > schema.max_retry_delay() {
            return Err(ConfigurationError::RetryDelayTooLarge {
                value: self.retry_delay,
                max: schema.max_retry_delay(),
            });
        }

        let endpoint = match self.endpoint {
            Some(EndpointInput::Raw(raw)) => Endpoint::parse(transport, &raw, schema)?,
            Some(EndpointInput::Typed(endpoint)) => {
                if !endpoint.matches(transport) {
                    return Err(ConfigurationError::InvalidEndpoint {
                        transport,
                        endpoint: endpoint.to_string(),
                        reason: "endpoint does not match the transport type".to_string(),
                    });
                }
                endpoint
            }
            None => return Err(ConfigurationError::MissingField("endpoint")),
        };

        Ok(ConnectionSpec {
            name: self.name,
            transport,
            protocol: self.protocol,
            endpoint,
            retry_limit,
            retry_delay: self.retry_delay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp(endpoint: &str) -> ConnectionSpecBuilder {
        ConnectionSpec::builder("Main")
            .transport(TransportType::Tcpip)
            .endpoint(endpoint)
    }

    #[test]
    fn test_build_tcp_spec() {
        let spec = tcp("127.0.0.1:8001")
            .retry_limit(3)
            .retry_delay(Duration::from_secs(1))
            .build()
            .unwrap();

        assert_eq!(spec.name(), "Main");
        assert_eq!(spec.protocol(), Protocol::Kiss);
        assert_eq!(
            spec.endpoint(),
            &Endpoint::Tcp {
                host: "127.0.0.1".to_string(),
                port: 8001
            }
        );
        assert_eq!(spec.retry_limit(), 3);
        assert_eq!(spec.retry_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_ipv6_endpoint() {
        let spec = tcp("[::1]:8001").build().unwrap();
        assert_eq!(spec.endpoint().to_string(), "[::1]:8001");

        assert!(tcp("::1:8001").build().is_err());
    }

    #[test]
    fn test_rejects_negative_retry_limit() {
        let err = tcp("localhost:8001").retry_limit(-1).build().unwrap_err();
        assert!(matches!(err, ConfigurationError::NegativeRetryLimit(-1)));
    }

    #[test]
    fn test_rejects_limits_above_schema() {
        let schema = SpecSchema::default()
            .with_max_retry_limit(2)
            .with_max_retry_delay(Duration::from_secs(5));

        let err = tcp("localhost:8001").retry_limit(3).build_with(&schema).unwrap_err();
        assert!(matches!(err, ConfigurationError::RetryLimitTooLarge { .. }));

        let err = tcp("localhost:8001")
            .retry_delay(Duration::from_secs(6))
            .build_with(&schema)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::RetryDelayTooLarge { .. }));
    }

    #[test]
    fn test_rejects_unparseable_endpoints() {
        for endpoint in ["", "localhost", "localhost:port", ":8001", "localhost:0", "localhost:70000"] {
            let err = tcp(endpoint).build().unwrap_err();
            assert!(
                matches!(err, ConfigurationError::InvalidEndpoint { .. }),
                "endpoint '{}' should be rejected",
                endpoint
            );
        }
    }

    #[test]
    fn test_requires_transport_and_endpoint() {
        let err = ConnectionSpec::builder("Main").endpoint("a:1").build().unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingField("transport")));

        let err = ConnectionSpec::builder("Main")
            .transport(TransportType::Tcpip)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingField("endpoint")));

        let err = ConnectionSpec::builder(" ").transport(TransportType::Tcpip).build().unwrap_err();
        assert!(matches!(err, ConfigurationError::EmptyName));
    }

    #[test]
    fn test_serial_endpoint_parsing() {
        let schema = SpecSchema::default().with_pair(TransportType::Serial, Protocol::Kiss);

        let spec = ConnectionSpec::builder("Radio")
            .transport(TransportType::Serial)
            .endpoint("/dev/ttyUSB0")
            .build_with(&schema)
            .unwrap();
        assert_eq!(
            spec.endpoint(),
            &Endpoint::Serial {
                device: PathBuf::from("/dev/ttyUSB0"),
                baud_rate: 9600
            }
        );

        let spec = ConnectionSpec::builder("Radio")
            .transport(TransportType::Serial)
            .endpoint("/dev/ttyUSB0@1200")
            .build_with(&schema)
            .unwrap();
        assert_eq!(spec.endpoint().to_string(), "/dev/ttyUSB0@1200");

        let err = ConnectionSpec::builder("Radio")
            .transport(TransportType::Serial)
            .endpoint("/dev/ttyUSB0@fast")
            .build_with(&schema)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidEndpoint { .. }));
    }

    #[test]
    fn test_typed_endpoint_must_match_transport() {
        let err = ConnectionSpec::builder("Main")
            .transport(TransportType::Tcpip)
            .endpoint_typed(Endpoint::Serial {
                device: PathBuf::from("/dev/ttyS0"),
                baud_rate: 9600,
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidEndpoint { .. }));
    }

    #[test]
    fn test_unsupported_pair() {
        let schema = SpecSchema::new(10, Duration::from_secs(60), 9600);
        let err = tcp("localhost:8001").build_with(&schema).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnsupportedPair { .. }));
    }
}
