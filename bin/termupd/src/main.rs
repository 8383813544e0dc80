//! ---
//! termup_section: "04-update-service"
//! termup_subsection: "binary"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Binary entrypoint for the update service daemon."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use prometheus::Registry;
use termup_common::config::{AppConfig, StorageBackend};
use termup_common::logging::init_tracing;
use termup_server::{ServerBuilder, Stores};
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Terminal update service daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, env = "TERMUP_LISTEN", help = "Override server.listen")]
    listen: Option<SocketAddr>,

    #[arg(long, env = "TERMUP_PUBLIC_URL", help = "Override server.public_url")]
    public_url: Option<String>,

    #[arg(long, value_enum, help = "Override storage.backend")]
    backend: Option<CliBackend>,

    #[arg(long, value_name = "DIR", help = "Override storage.root")]
    storage_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliBackend {
    Filesystem,
    Memory,
}

impl From<CliBackend> for StorageBackend {
    fn from(value: CliBackend) -> Self {
        match value {
            CliBackend::Filesystem => StorageBackend::Filesystem,
            CliBackend::Memory => StorageBackend::Memory,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Serve the publish and update endpoints")]
    Serve,
    #[command(about = "Load and validate configuration, then exit")]
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/termup.toml"));
    candidates.push(PathBuf::from("/etc/termup/termup.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    if let Some(url) = cli.public_url {
        config.server.public_url = url;
    }
    if let Some(backend) = cli.backend {
        config.storage.backend = backend.into();
    }
    if let Some(root) = cli.storage_root {
        config.storage.root = root;
    }
    config
        .validate()
        .context("configuration invalid after command-line overrides")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Validate => {
            match &loaded.source {
                Some(path) => println!("configuration OK ({})", path.display()),
                None => println!("configuration OK (built-in defaults)"),
            }
            Ok(())
        }
        Commands::Serve => serve(config, loaded.source).await,
    }
}

async fn serve(config: AppConfig, source: Option<PathBuf>) -> Result<()> {
    let _log_guard = init_tracing("termupd", &config.logging)?;
    match &source {
        Some(path) => info!(config = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; using defaults"),
    }

    let stores = Stores::from_config(&config.storage)?;
    let mut builder = ServerBuilder::from_config(&config.server, stores)?;
    if config.metrics.enabled {
        builder = builder.with_metrics_registry(Arc::new(Registry::new()));
    } else {
        info!("metrics disabled by configuration");
    }
    let handle = builder.spawn().await?;
    info!(
        address = %handle.local_addr(),
        public_url = %handle.public_url(),
        "termupd running; waiting for termination signal"
    );

    shutdown_signal().await;
    info!("shutdown signal received");
    handle.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        tokio::select! {
            _ = ctrl_c() => {},
            _ = terminate() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(err) => {
            warn!(?err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}
