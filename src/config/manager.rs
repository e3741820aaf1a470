//! Configuration Manager

use super::{Config, SpecSchema};
use crate::connection::ConnectionSpec;
use crate::Result;
use anyhow::{bail, Context};
use std::collections::HashSet;
use std::path::Path;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file, or from `load_from_env` when the file
    /// does not exist
    pub fn load_from_file(path: &Path, schema: &SpecSchema) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config = Self::load_from_str(&content, schema)
                .with_context(|| format!("Invalid config file: {}", path.display()))?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!(
                "Configuration file not found at {}, using defaults and environment",
                path.display()
            );
            Self::load_from_env(schema)
        }
    }

    /// Parse and validate configuration text
    pub fn load_from_str(content: &str, schema: &SpecSchema) -> Result<Config> {
        let config: Config = toml::from_str(content).context("Failed to parse configuration")?;
        config
            .validate(schema)
            .context("Configuration validation failed")?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    ///
    /// Starts from the defaults (a single "Main" TCP connection) and applies
    /// any `TNCPOOL_*` overrides to it.
    pub fn load_from_env(schema: &SpecSchema) -> Result<Config> {
        let mut config = Config::default();

        if let Ok(log_level) = std::env::var("TNCPOOL_LOG_LEVEL") {
            config.logging.level = log_level;
        }

        if let Ok(timeout) = std::env::var("TNCPOOL_SHUTDOWN_TIMEOUT") {
            config.shutdown.timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid TNCPOOL_SHUTDOWN_TIMEOUT: {}", timeout))?;
        }

        if let Some(main) = config.connections.first_mut() {
            if let Ok(host) = std::env::var("TNCPOOL_TNC_HOST") {
                main.host = Some(host);
            }

            if let Ok(port) = std::env::var("TNCPOOL_TNC_PORT") {
                main.port = Some(
                    port.parse::<u16>()
                        .with_context(|| format!("Invalid TNCPOOL_TNC_PORT: {}", port))?,
                );
            }

            if let Ok(limit) = std::env::var("TNCPOOL_RETRY_LIMIT") {
                main.retry_limit = limit
                    .parse::<i64>()
                    .with_context(|| format!("Invalid TNCPOOL_RETRY_LIMIT: {}", limit))?;
            }

            if let Ok(delay) = std::env::var("TNCPOOL_RETRY_DELAY") {
                main.retry_delay = humantime::parse_duration(&delay)
                    .with_context(|| format!("Invalid TNCPOOL_RETRY_DELAY: {}", delay))?;
            }
        }

        config.validate(schema)?;
        Ok(config)
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self, schema: &SpecSchema) -> Result<()> {
        self.validate_logging_config()
            .context("Logging configuration validation failed")?;

        self.validate_shutdown_config()
            .context("Shutdown configuration validation failed")?;

        self.connection_specs(schema)
            .context("Connection configuration validation failed")?;

        Ok(())
    }

    /// Convert every connection entry into a validated specification
    pub fn connection_specs(&self, schema: &SpecSchema) -> Result<Vec<ConnectionSpec>> {
        let mut seen = HashSet::new();
        let mut specs = Vec::with_capacity(self.connections.len());

        for (i, conn) in self.connections.iter().enumerate() {
            if !seen.insert(conn.name.as_str()) {
                bail!("Connection {} reuses the name '{}'", i, conn.name);
            }

            let spec = conn
                .to_spec(schema)
                .with_context(|| format!("Connection {} ('{}') is invalid", i, conn.name))?;
            specs.push(spec);
        }

        Ok(specs)
    }

    fn validate_logging_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            bail!("logging.level must be one of: {}", valid_log_levels.join(", "));
        }

        if let Some(path) = &self.logging.frame_log {
            if path.as_os_str().is_empty() {
                bail!("logging.frame_log must not be empty");
            }
        }

        Ok(())
    }

    fn validate_shutdown_config(&self) -> Result<()> {
        if self.shutdown.timeout.is_zero() {
            bail!("shutdown.timeout must be greater than 0");
        }

        if let Some(interval) = self.shutdown.status_interval {
            if interval.is_zero() {
                bail!("shutdown.status_interval must be greater than 0");
            }
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(&mut self, log_level: Option<&str>, frame_log: Option<&Path>) {
        if let Some(level) = log_level {
            self.logging.level = level.to_string();
            tracing::info!("CLI override: log level set to {}", level);
        }

        if let Some(path) = frame_log {
            self.logging.frame_log = Some(path.to_path_buf());
            tracing::info!("CLI override: frame log set to {}", path.display());
        }
    }
}
