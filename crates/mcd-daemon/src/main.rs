//! Machine Config Daemon - per-node update agent
//!
//! The daemon provides:
//! - One-shot application of a MachineConfig (`--once-from`)
//! - A control loop publishing Working/Done/Degraded on the node record
//! - I/O scheduler tuning on control-plane nodes when the etcd leader changes

use anyhow::{bail, Context};
use clap::Parser;
use mcd_daemon::config::DaemonConfig;
use mcd_daemon::source::ConfigOrigin;
use mcd_daemon::{
    ApplyOutcome, ConfigChange, Daemon, DaemonError, InMemoryNodeStore, RpmOstreeClient,
};
use mcd_types::{NodeRole, OperatingSystem};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Machine Config Daemon CLI
#[derive(Parser)]
#[command(name = "mcd")]
#[command(about = "Machine Config Daemon - per-node update agent", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MCD_CONFIG")]
    config: Option<String>,

    /// Name of the node this daemon runs on
    #[arg(long, env = "NODE_NAME")]
    node_name: Option<String>,

    /// Node role (worker or control-plane)
    #[arg(long, env = "MCD_NODE_ROLE")]
    role: Option<NodeRole>,

    /// Apply the config at this path or URL once and exit
    #[arg(long)]
    once_from: Option<String>,

    /// Log level
    #[arg(long, env = "MCD_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "MCD_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(name) = cli.node_name {
        config.node.name = name;
    }
    if let Some(role) = cli.role {
        config.node.role = role;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if config.node.name.is_empty() {
        return Err(DaemonError::Config(
            "node name is required (--node-name, NODE_NAME or node.name)".to_string(),
        )
        .into());
    }

    let operating_system = detect_operating_system(&config.paths.os_release).await;
    let updater = Arc::new(RpmOstreeClient::new(operating_system, &config.updater));
    let store = Arc::new(InMemoryNodeStore::new());

    let mut daemon = Daemon::new(&config, operating_system, updater, store);
    daemon.initialize().await.context("failed to initialize daemon")?;

    match cli.once_from {
        Some(location) => run_once(&daemon, &location).await,
        None => run(daemon).await,
    }
}

async fn detect_operating_system(os_release: &Path) -> OperatingSystem {
    match tokio::fs::read_to_string(os_release).await {
        Ok(contents) => OperatingSystem::from_os_release(&contents),
        Err(e) => {
            warn!(path = %os_release.display(), error = %e, "Failed to read os-release");
            OperatingSystem::Unknown
        }
    }
}

async fn run_once(daemon: &Daemon, location: &str) -> anyhow::Result<()> {
    let origin = ConfigOrigin::parse(location);
    let outcome = daemon
        .apply_from(&origin)
        .await
        .with_context(|| format!("failed to apply config from {}", origin))?;

    match outcome {
        ApplyOutcome::Done => {
            info!(origin = %origin, "Config applied");
            Ok(())
        }
        ApplyOutcome::RebootRequired { reason } => {
            bail!("config from {} cannot be applied in place: {} changed", origin, reason)
        }
        ApplyOutcome::Degraded(e) => {
            bail!("config from {} left the node degraded: {}", origin, e)
        }
    }
}

async fn run(daemon: Daemon) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let (leader_events, watcher) = match daemon.start_leader_watch(shutdown_rx.clone()).await {
        Some(watch) => (Some(watch.events), Some(watch.handle)),
        None => (None, None),
    };

    // Kept open so the loop runs until shutdown; nothing feeds it in
    // standalone mode.
    let (_changes_tx, changes_rx) = mpsc::channel::<ConfigChange>(1);
    daemon.run(changes_rx, leader_events, shutdown_rx).await?;

    if let Some(watcher) = watcher {
        watcher.await.context("leader watcher panicked")?;
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
