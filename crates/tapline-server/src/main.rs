//! # Tapline Server
//!
//! Main entry point for the tapline relay server.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tapline_core::{Config, LoggingConfig, PingProbe, RelayServer};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let (config, config_path) = load_config()?;

    // Initialize logging; the guard flushes the log file on exit
    let _log_guard = init_logging(&config.logging)?;

    info!(
        "Starting tapline relay server v{}",
        env!("CARGO_PKG_VERSION")
    );
    match config_path {
        Some(path) => info!("Loaded configuration from {}", path),
        None => info!("No config file found, using defaults"),
    }

    let config = Arc::new(config);
    let probe = PingProbe::from_config(&config.probe);

    let server = RelayServer::bind(Arc::clone(&config), probe)
        .await
        .context("Failed to start relay server")?;
    let addr = server.local_addr()?;

    let server_handle = tokio::spawn(server.run());

    info!("Tapline is running on {}", addr);

    tokio::select! {
        result = server_handle => match result {
            Ok(Ok(())) => error!("Relay server stopped"),
            Ok(Err(e)) => error!("Relay server error: {}", e),
            Err(e) => error!("Relay server task failed: {}", e),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Relay server closed");
    Ok(())
}

/// Load configuration from file or use defaults.
/// Returns (Config, Option<config_path>)
fn load_config() -> Result<(Config, Option<String>)> {
    let config_paths = ["config.toml", "/etc/tapline/config.toml"];

    for path in config_paths {
        if Path::new(path).exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path))?;
            return Ok((config, Some(path.to_string())));
        }
    }

    Ok((Config::default(), None))
}

/// Initialize logging to stdout, or to `logging.file` when set.
fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false);

    match &logging.file {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", file))?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            builder.with_writer(writer).with_ansi(false).init();
            Ok(Some(guard))
        }
        None => {
            builder.init();
            Ok(None)
        }
    }
}
