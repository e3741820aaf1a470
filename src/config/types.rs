//! Configuration Types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::SpecSchema;
use crate::connection::{ConnectionSpec, Protocol, TransportType};
use crate::error::ConfigurationError;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    /// File receiving one line per decoded frame
    pub frame_log: Option<PathBuf>,
}

/// Shutdown and supervision configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShutdownConfig {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default, with = "humantime_serde")]
    pub status_interval: Option<Duration>,
}

/// One TNC connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    pub name: String,
    pub transport: TransportType,
    #[serde(default = "default_protocol")]
    pub protocol: Protocol,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub device: Option<PathBuf>,
    pub baud_rate: Option<u32>,
    #[serde(default)]
    pub retry_limit: i64,
    #[serde(default, with = "humantime_serde")]
    pub retry_delay: Duration,
}

fn default_protocol() -> Protocol {
    Protocol::Kiss
}

impl ConnectionConfig {
    /// TCP connection entry
    pub fn tcp(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            transport: TransportType::Tcpip,
            protocol: Protocol::Kiss,
            host: Some(host.into()),
            port: Some(port),
            device: None,
            baud_rate: None,
            retry_limit: 0,
            retry_delay: Duration::ZERO,
        }
    }

    /// Endpoint string in the form `ConnectionSpec` parses
    pub fn endpoint_string(&self) -> Result<String, ConfigurationError> {
        match self.transport {
            TransportType::Tcpip => {
                let host = self.host.as_deref().ok_or(ConfigurationError::MissingField("host"))?;
                let port = self.port.ok_or(ConfigurationError::MissingField("port"))?;
                if host.contains(':') && !host.starts_with('[') {
                    Ok(format!("[{}]:{}", host, port))
                } else {
                    Ok(format!("{}:{}", host, port))
                }
            }
            TransportType::Serial => {
                let device = self
                    .device
                    .as_ref()
                    .ok_or(ConfigurationError::MissingField("device"))?;
                match self.baud_rate {
                    Some(baud) => Ok(format!("{}@{}", device.display(), baud)),
                    None => Ok(device.display().to_string()),
                }
            }
        }
    }

    /// Build the validated connection specification for this entry
    pub fn to_spec(&self, schema: &SpecSchema) -> Result<ConnectionSpec, ConfigurationError> {
        ConnectionSpec::builder(self.name.clone())
            .transport(self.transport)
            .protocol(self.protocol)
            .endpoint(self.endpoint_string()?)
            .retry_limit(self.retry_limit)
            .retry_delay(self.retry_delay)
            .build_with(schema)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            frame_log: None,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            status_interval: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut main = ConnectionConfig::tcp("Main", "127.0.0.1", 8001);
        main.retry_limit = 3;
        main.retry_delay = Duration::from_secs(5);

        Self {
            logging: LoggingConfig::default(),
            shutdown: ShutdownConfig::default(),
            connections: vec![main],
        }
    }
}
