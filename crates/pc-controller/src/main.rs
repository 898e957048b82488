//! Portcullis terminal controller daemon
//!
//! Loads configuration, connects to the central server and runs the
//! controller loops until SIGINT or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pc_core::config::{self, Settings};
use pc_controller::{Controller, HttpCentralClient};

/// How long to wait for background tasks after shutdown
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "portcullis")]
#[command(about = "Bastion terminal controller")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace); overrides LOG_LEVEL
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let store = config::load_store(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    let settings = Settings::from_store(&store);

    init_logging(&args, &settings);
    tracing::info!(config = %config_path.display(), "Portcullis controller starting...");

    let client = Arc::new(
        HttpCentralClient::from_settings(&settings).context("Failed to build central client")?,
    );
    tracing::info!(core_host = %client.base_url(), terminal = %settings.name, "Using central server");

    let controller = Controller::builder(Arc::new(store), client.clone(), client).build();

    let (signal_tx, mut signal_rx) = mpsc::channel::<&'static str>(1);
    tokio::spawn(forward_signals(signal_tx));

    controller.bootstrap().await;
    controller.start_gateways();

    tokio::select! {
        signal = signal_rx.recv() => {
            if let Some(signal) = signal {
                tracing::info!("Received {}, initiating shutdown...", signal);
            }
            controller.shutdown().await;
        }
        _ = controller.wait() => {}
    }

    controller.wait().await;
    if !controller.join(JOIN_TIMEOUT).await {
        tracing::warn!("Some background tasks were aborted");
    }

    tracing::info!("Controller shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins; otherwise `--log-level`, then `LOG_LEVEL`. Foreground mode
/// and `DEBUG = true` force debug.
fn init_logging(args: &Args, settings: &Settings) {
    let level = if args.foreground || settings.debug {
        "debug".to_string()
    } else {
        args.log_level
            .clone()
            .unwrap_or_else(|| settings.log_level.clone())
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or(level),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Send the name of the first SIGINT or SIGTERM received
async fn forward_signals(tx: mpsc::Sender<&'static str>) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let name = tokio::select! {
        _ = ctrl_c => "Ctrl+C",
        _ = terminate => "SIGTERM",
    };

    let _ = tx.send(name).await;
}
