//! tncpool - KISS TNC connection service
//!
//! Connects to every configured TNC, logs the frames they deliver, and shuts
//! the connections down cleanly on SIGINT/SIGTERM.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tncpool::{
    config::ConfigManager,
    frame_log::FrameLogger,
    shutdown::{ShutdownReason, StatusReporter},
    ConnectionPool, FrameCallback, ShutdownCoordinator, SpecSchema,
};

/// CLI arguments for tncpool
#[derive(Parser, Debug)]
#[command(name = "tncpool")]
#[command(about = "Connection pool for KISS Terminal Node Controllers")]
#[command(version)]
#[command(long_about = "
tncpool - Connection pool for KISS Terminal Node Controllers

Opens one worker per configured TNC connection, retries refused connections
with a fixed delay, and logs every received frame.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables (used when no configuration file exists):
  TNCPOOL_TNC_HOST          - Host of the \"Main\" TNC
  TNCPOOL_TNC_PORT          - KISS TCP port of the \"Main\" TNC
  TNCPOOL_RETRY_LIMIT       - Retries after the first refused connection
  TNCPOOL_RETRY_DELAY       - Delay between attempts (e.g., 5s)
  TNCPOOL_SHUTDOWN_TIMEOUT  - Bound on shutdown (e.g., 10s)
  TNCPOOL_LOG_LEVEL         - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "tncpool.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level (overrides config file)")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Frame log file (overrides config file)
    #[arg(long, help = "Append received frames to this file")]
    pub frame_log: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let schema = SpecSchema::default();

    // Load configuration with priority: CLI args > config file > environment > defaults
    let mut config = ConfigManager::load_from_file(&args.config, &schema)?;

    config.merge_with_cli_args(args.log_level.as_deref(), args.frame_log.as_deref());
    config
        .validate(&schema)
        .context("Final configuration validation failed")?;

    init_tracing(&args, &config.logging.level)?;

    info!("Starting tncpool v{}", env!("CARGO_PKG_VERSION"));

    let specs = config.connection_specs(&schema)?;

    if args.validate_config {
        info!("Configuration is valid");
        info!("Configuration summary:");
        info!("  Log level: {}", config.logging.level);
        info!("  Shutdown timeout: {:?}", config.shutdown.timeout);
        for spec in &specs {
            info!(
                "  TNC {}: {}/{} {} (retry limit {}, retry delay {:?})",
                spec.name(),
                spec.transport(),
                spec.protocol(),
                spec.endpoint(),
                spec.retry_limit(),
                spec.retry_delay()
            );
        }
        return Ok(());
    }

    if specs.is_empty() {
        bail!("No TNC connections configured");
    }

    let frame_logger = match &config.logging.frame_log {
        Some(path) => Some(Arc::new(FrameLogger::open(path)?)),
        None => None,
    };

    let pool = Arc::new(ConnectionPool::new());
    let coordinator = ShutdownCoordinator::new(config.shutdown.timeout);

    for spec in specs {
        let name = spec.name().to_string();
        let callback = frame_callback(&name, frame_logger.as_ref());
        pool.connect(&name, spec, callback)
            .with_context(|| format!("Failed to start TNC connection {}", name))?;
    }

    let reporter = config
        .shutdown
        .status_interval
        .map(|interval| StatusReporter::spawn(&coordinator, Arc::clone(&pool), interval));

    info!("tncpool started with {} TNC connections", pool.names().len());
    info!("Press Ctrl+C or send SIGTERM/SIGINT to shutdown gracefully");

    let reason = coordinator.wait_for_shutdown(&pool).await;

    if let Some(reporter) = reporter {
        reporter.join().await;
    }
    coordinator.shutdown_pool(&pool).await;

    info!("tncpool shutdown complete");

    if reason == ShutdownReason::AllConnectionsEnded {
        error!("Every TNC connection terminated; restart required");
        bail!("All TNC connections terminated");
    }

    Ok(())
}

/// Callback logging each frame, and writing it to the frame log when enabled
fn frame_callback(name: &str, frame_logger: Option<&Arc<FrameLogger>>) -> FrameCallback {
    let tnc = name.to_string();
    let printer = FrameCallback::new(move |frame| {
        info!(
            tnc = %tnc,
            port = frame.port,
            len = frame.payload.len(),
            "Received frame: {}",
            frame.payload_hex()
        );
        Ok(())
    });

    match frame_logger {
        Some(logger) => FrameCallback::fan_out(vec![printer, logger.callback(name)]),
        None => printer,
    }
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs, configured_level: &str) -> Result<()> {
    let log_level = if args.verbose { "debug" } else { configured_level };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
