//! Admission gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                  ADMISSION GATEWAY                    │
//!                     │                                                       │
//!  Client Request     │  ┌─────────┐   ┌──────┐   ┌────────┐   ┌───────────┐ │
//!  ───────────────────┼─▶│request  │──▶│ path │──▶│ header │──▶│ blacklist │ │
//!                     │  │id, trace│   └──────┘   └────────┘   └─────┬─────┘ │
//!                     │  └─────────┘                                  │       │
//!                     │                                  cache ◀──────┤       │
//!                     │                                               ▼       │
//!  Response           │  ┌─────────┐                          ┌────────────┐ │
//!  ◀──────────────────┼──│ handler │◀─────────────────────────│ rate_limit │ │
//!                     │  └─────────┘                          └────────────┘ │
//!                     │                                                       │
//!                     │  Any guard may short-circuit with a JSON rejection.   │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use admission_guard::config::{load_config, ConfigWatcher, GatewayConfig};
use admission_guard::http::HttpServer;
use admission_guard::lifecycle::{startup, Shutdown};
use admission_guard::observability::{logging, metrics};
use admission_guard::security::SystemClock;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "admission-guard")]
#[command(about = "Request admission gateway", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the guard chain when the config file changes.
    #[arg(long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("admission-guard v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        order = ?config.guards.order,
        rate = config.guards.rate_limit.rate,
        burst = config.guards.rate_limit.burst,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let cache = startup::build_cache(&config).await?;
    let server = HttpServer::new(config.clone(), cache, Arc::new(SystemClock))?;

    // The watcher must stay alive for the life of the server.
    let (config_updates, _watcher) = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        _ => {
            let (_, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(shutdown.trigger_on_os_signal());

    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
