//! Guard Gateway
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                   GUARD GATEWAY                  │
//!   Client Request       │  ┌────────┐   ┌───────────┐   ┌──────────────┐   │
//!   ─────────────────────┼─▶│  http  │──▶│ admission │──▶│ quota check  │   │
//!                        │  │ server │   │   gate    │   │ (tenant)     │   │
//!                        │  └────────┘   └───────────┘   └──────┬───────┘   │
//!                        │                                      ▼           │
//!                        │                ┌──────────┐   ┌──────────────┐   │
//!                        │                │ circuit  │◀──│ health cache │   │
//!                        │                │ breaker  │   └──────────────┘   │
//!                        │                └────┬─────┘                      │
//!                        │                     ▼                            │      Guard
//!   Uniform Response     │  ┌────────┐   ┌──────────┐                       │     Services
//!   ◀────────────────────┼──│response│◀──│  router  │◀──────────────────────┼───────────
//!                        │  └────────┘   └──────────┘                       │
//!                        │                                                  │
//!                        │   events · metrics · config reload · lifecycle   │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;

use guard_gateway::config::watcher::ConfigWatcher;
use guard_gateway::config::{load_config, GatewayConfig};
use guard_gateway::lifecycle::{spawn_signal_handler, Shutdown};
use guard_gateway::observability::{logging, metrics};
use guard_gateway::{HttpServer, Orchestrator};

#[derive(Parser)]
#[command(name = "guard-gateway", version, about = "Guard service orchestration gateway")]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "GUARD_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path).with_context(|| format!("loading {}", path.display()))?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability).context("installing tracing subscriber")?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "guard-gateway starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        max_concurrent = config.admission.max_concurrent,
        quota_enabled = config.quota.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .with_context(|| format!("binding {}", config.listener.bind_address))?;

    let orchestrator = Arc::new(Orchestrator::new(config).context("building orchestrator")?);

    // Keep the watcher alive for the lifetime of the server.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let watcher = watcher.run().context("starting config watcher")?;
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                while let Some(next) = updates.recv().await {
                    if let Err(e) = orchestrator.reload(next) {
                        tracing::error!(error = %e, "Rejected reloaded configuration");
                    }
                }
            });
            Some(watcher)
        }
        None => None,
    };

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(orchestrator.clone());
    let stop = shutdown.clone();
    server
        .run(listener, async move { stop.wait().await })
        .await
        .context("serving HTTP")?;

    orchestrator.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
