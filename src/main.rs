//! LLM provider gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────────────┐
//!                     │                         GATEWAY                              │
//!                     │                                                              │
//!  POST /v1/generate  │  ┌─────────┐    ┌──────────────┐    ┌─────────┐              │
//!  ───────────────────┼─▶│  http   │───▶│   gateway    │───▶│  cache  │── hit ──┐    │
//!                     │  │ server  │    │ orchestrator │    └─────────┘         │    │
//!                     │  └─────────┘    └──────┬───────┘                        │    │
//!                     │                        │ miss                           │    │
//!                     │                        ▼                                │    │
//!                     │  ┌─────────┐    ┌──────────────┐    ┌───────────┐       │    │   Provider
//!                     │  │  vault  │───▶│  resilience  │───▶│ providers │───────┼────┼──▶ APIs
//!                     │  │ (AEAD)  │    │   retries    │    └───────────┘       │    │
//!                     │  └─────────┘    └──────┬───────┘                        │    │
//!                     │                        ▼                                │    │
//!  Response envelope  │                 ┌──────────────┐                        │    │
//!  ◀──────────────────┼─────────────────│   recovery   │◀───────────────────────┘    │
//!                     │                 │ (json/yaml)  │                             │
//!                     │                 └──────────────┘                             │
//!                     │  ┌────────────────────────────────────────────────────────┐  │
//!                     │  │ Cross-cutting: config · observability · lifecycle ·    │  │
//!                     │  │                admin                                   │  │
//!                     │  └────────────────────────────────────────────────────────┘  │
//!                     └──────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use llm_gateway::config::{load_config, resolve_config_path, ConfigWatcher, GatewayConfig};
use llm_gateway::http::HttpServer;
use llm_gateway::lifecycle::{self, signals, Shutdown};
use llm_gateway::observability::{logging, metrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = resolve_config_path();
    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "llm-gateway starting");

    tracing::info!(
        config_path = ?config_path,
        bind_address = %config.listener.bind_address,
        providers = config.providers.len(),
        cache_enabled = config.cache.enabled,
        admin_enabled = config.admin.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let master_key = lifecycle::master_key_from_env(&config)?;
    let components = lifecycle::build_gateway(&config, &master_key)?;
    drop(master_key);

    let shutdown = Arc::new(Shutdown::new());
    let sweeper = lifecycle::spawn_background_tasks(&config, &components, shutdown.subscribe());

    // Keep the watcher alive for the life of the server.
    let (config_updates, _watcher) = match &config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, config.clone());
            match watcher.run() {
                Ok(handle) => (updates, Some(handle)),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload unavailable");
                    (updates, None)
                }
            }
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(&config, components.gateway.clone());
    let server_shutdown = shutdown.subscribe();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { signals::shutdown_on_signal(&shutdown).await });
    }

    server.run(listener, config_updates, server_shutdown).await?;

    if let Some(handle) = sweeper {
        let _ = handle.await;
    }
    if let Err(e) = components.credential_store.persist().await {
        tracing::error!(error = %e, "Failed to persist credentials on shutdown");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
