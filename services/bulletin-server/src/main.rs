//! Weather bulletin service.
//!
//! Keeps live CAP warnings and citypage current conditions in memory with:
//! - Notification-driven fetching and reconciliation
//! - Reference files that rebuild both feeds after a restart
//! - Periodic expiry of lapsed alerts
//! - Polling and streaming HTTP APIs

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use bulletin_server::config::BulletinConfig;
use bulletin_server::server;
use bulletin_server::state::AppState;
use ingestion::NotificationHub;

#[derive(Parser, Debug)]
#[command(name = "bulletin-server")]
#[command(about = "Weather alert and current-conditions service")]
struct Args {
    /// Configuration file
    #[arg(long, env = "BULLETIN_CONFIG", default_value = "config/bulletins.yaml")]
    config: PathBuf,

    /// Directory for the feeds' reference files
    #[arg(long, env = "STATE_DIR", default_value = "/data/bulletins")]
    state_dir: PathBuf,

    /// HTTP port
    #[arg(long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting weather bulletin service");

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let config = BulletinConfig::load(&args.config)?;
    let hub = Arc::new(NotificationHub::new());
    let state = Arc::new(AppState::from_config(&config, &args.state_dir, hub, Some(metrics)).await?);

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
    };

    server::run_server(state.clone(), args.port, shutdown).await?;

    state.shutdown().await;
    info!("Bulletin service stopped");

    Ok(())
}
