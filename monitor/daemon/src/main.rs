//! Monitor Daemon - Border Crossing Polling Service
//!
//! Entry point for the crossing monitor. Loads configuration, builds the
//! polling engine and runs it until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Start with the default config file
//! monitor-daemon
//!
//! # With config file
//! monitor-daemon --config /etc/crossing-monitor/monitor.toml
//!
//! # Poll every route once, print the snapshot as JSON and exit
//! monitor-daemon --once
//!
//! # Dump a route's CSV log to stdout
//! monitor-daemon --export sy-north > sy-north.csv
//!
//! # Verbose logging
//! RUST_LOG=debug monitor-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown (in-flight polls complete)

mod server;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};

use monitor_core::config::{default_config_path, load_config_from_path, ConfigOverrides};
use monitor_core::RouteId;

use server::MonitorServer;

/// Monitor Daemon - Polls border crossing routes and records travel-time history
#[derive(Parser, Debug)]
#[command(name = "monitor-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "MONITOR_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "MONITOR_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Polling interval in seconds (overrides config and environment)
    #[arg(short = 'i', long, value_name = "SECS")]
    interval_secs: Option<u64>,

    /// Directory for the per-route CSV logs (overrides config and environment)
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Readings kept in memory per route (overrides config and environment)
    #[arg(long, value_name = "N")]
    store_capacity: Option<usize>,

    /// Routing provider API key (overrides config and MONITOR_API_KEY)
    #[arg(long, value_name = "KEY")]
    api_key: Option<String>,

    /// Run a single cycle, print the snapshot as JSON and exit
    #[arg(long, conflicts_with = "export")]
    once: bool,

    /// Write a route's durable log to stdout and exit
    #[arg(long, value_name = "ROUTE_ID")]
    export: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(secs) = self.interval_secs {
            overrides = overrides.with_interval_secs(secs);
        }
        if let Some(ref dir) = self.log_dir {
            overrides = overrides.with_log_dir(dir.clone());
        }
        if let Some(capacity) = self.store_capacity {
            overrides = overrides.with_store_capacity(capacity);
        }
        if let Some(ref key) = self.api_key {
            overrides = overrides.with_api_key(key.clone());
        }
        overrides
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("monitor_daemon={level},monitor_core={level}"))
    });

    // Logs go to stderr so --once and --export keep stdout clean
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Forward SIGTERM/SIGINT to the shutdown channel
fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
        }
        let _ = shutdown_tx.send(true);
    });

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Monitor Daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.clone().or_else(default_config_path);
    if let Some(ref path) = config_path {
        info!(config_path = ?path, "Config file");
    }

    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    info!(source = %config.source(), "Configuration resolved");

    if let Some(route) = args.export {
        let server = MonitorServer::for_export(config)?;
        let mut stdout = std::io::stdout().lock();
        return server.export(&RouteId::new(route), &mut stdout);
    }

    config.validate().context("Invalid configuration")?;
    let server = MonitorServer::new(config)?;

    if args.once {
        let report = server.run_once().await?;
        let snapshot = serde_json::to_string_pretty(&server.query().snapshot())
            .context("Failed to serialize snapshot")?;
        println!("{snapshot}");
        if !report.failed.is_empty() {
            anyhow::bail!("{} route(s) failed to poll", report.failed.len());
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_handler(shutdown_tx)?;

    match server.run(shutdown_rx).await {
        Ok(()) => {
            info!("Monitor daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e)
        }
    }
}
