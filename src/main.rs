//! Proxy Supervisor
//!
//! Control plane process: keeps the runtime picture of routers, services and
//! middlewares for every configuration generation and probes backends.
//!
//! # Architecture Overview
//!
//! ```text
//!   static config (TOML)          dynamic config (TOML, watched)
//!          │                                │
//!          ▼                                ▼
//!   ┌─────────────┐   generation    ┌──────────────────┐
//!   │   config    │ ──────────────▶ │    supervisor    │
//!   └─────────────┘                 │  runtime records │
//!                                   │  routing graph   │
//!                                   │  entry points    │
//!                                   └────────┬─────────┘
//!                                            │ rearm
//!                                            ▼
//!   ┌─────────────┐  mark_up/down   ┌──────────────────┐
//!   │load_balancer│ ◀────────────── │  health engine   │ ───▶ backends
//!   │ propagators │                 │ (per-service     │
//!   └─────────────┘                 │  dual cadence)   │
//!                                   └──────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use proxy_supervisor::config::dynamic::Configuration;
use proxy_supervisor::config::loader::{load_config, load_dynamic_config};
use proxy_supervisor::config::watcher::ConfigWatcher;
use proxy_supervisor::config::SupervisorConfig;
use proxy_supervisor::lifecycle::{shutdown_signal, Shutdown};
use proxy_supervisor::observability::{logging, metrics};
use proxy_supervisor::Supervisor;

#[derive(Parser)]
#[command(name = "proxy-supervisor")]
#[command(about = "Runtime configuration supervisor and health checker", long_about = None)]
struct Cli {
    /// Static configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dynamic configuration file, overrides `providers.file.path`.
    #[arg(short, long)]
    dynamic: Option<PathBuf>,

    /// Apply the dynamic configuration once, print the runtime records as JSON and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SupervisorConfig::default(),
    };

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "proxy-supervisor starting");
    tracing::info!(
        entry_points = config.entry_points.len(),
        "Configuration loaded"
    );

    let dynamic_path = cli.dynamic.clone().or_else(|| {
        config
            .providers
            .file
            .as_ref()
            .map(|file| PathBuf::from(&file.path))
    });
    let watch = cli.dynamic.is_some()
        || config.providers.file.as_ref().is_some_and(|file| file.watch);

    let initial = match &dynamic_path {
        Some(path) => load_dynamic_config(path)?,
        None => {
            tracing::warn!("No dynamic configuration provider, starting empty");
            Configuration::default()
        }
    };

    let shutdown = Shutdown::new();
    let supervisor = Supervisor::new(&config, &shutdown);

    if cli.check {
        let snapshot = supervisor.apply(initial).await;
        supervisor.stop().await;
        println!("{}", serde_json::to_string_pretty(&snapshot.runtime)?);
        return Ok(());
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    supervisor.apply(initial).await;

    // Keep the notify watcher alive for the life of the loop.
    let (_watcher, mut updates) = match dynamic_path.filter(|_| watch) {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(&path);
            (Some(watcher.run()?), Some(updates))
        }
        None => (None, None),
    };

    let signal = shutdown_signal();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            _ = &mut signal => break,
            Some(configuration) = next_update(&mut updates) => {
                supervisor.apply(configuration).await;
            }
        }
    }

    shutdown.trigger();
    supervisor.stop().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn next_update(
    updates: &mut Option<tokio::sync::mpsc::UnboundedReceiver<Configuration>>,
) -> Option<Configuration> {
    match updates {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
