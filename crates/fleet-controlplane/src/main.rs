//! Fleet control plane daemon
//!
//! Serves the node and operator HTTP endpoints over the configured store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleet_core::config::{self, ControlPlaneConfig, StoreBackendKind};
use fleet_core::App;
use fleet_controlplane::geoip::{GeoLocator, HttpGeoLocator, StaticGeoLocator};
use fleet_controlplane::registry::run_registry_sweep;
use fleet_controlplane::{server, ControlPlaneState};
use fleet_store::{KeySpace, MemoryBackend, RedisBackend, StateStore};

#[derive(Parser)]
#[command(name = "fleet-controlplane")]
#[command(about = "Fleet control plane daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "FLEET_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Fleet control plane starting...");

    let config: ControlPlaneConfig = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                ControlPlaneConfig::default()
            })
        } else {
            tracing::info!("Using default configuration");
            ControlPlaneConfig::default()
        }
    };

    let bind_addr = args.bind.unwrap_or_else(|| config.bind_address.clone());

    let store = open_store(&config).await?;
    tracing::info!("State store backend: {}", store.backend_name());

    let apps: Vec<App> = config.catalog.apps.iter().map(App::from).collect();
    if let Err(e) = store.set_apps(&apps).await {
        tracing::warn!("Failed to sync app catalog to store: {}", e);
    } else {
        tracing::info!("Synced {} catalog apps", apps.len());
    }

    let locator: Arc<dyn GeoLocator> = if config.geo.endpoint.is_empty() {
        tracing::warn!("No geo-ip endpoint configured - every node resolves to no region");
        Arc::new(StaticGeoLocator::new())
    } else {
        Arc::new(
            HttpGeoLocator::new(config.geo.endpoint.clone(), config.geo.timeout)
                .context("Failed to build geo-ip client")?,
        )
    };

    let sweep_interval = config.registry.sweep_interval;
    let state = Arc::new(ControlPlaneState::new(config, store, locator));

    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
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

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let sweep = tokio::spawn(run_registry_sweep(
        Arc::clone(state.node_registry()),
        Arc::clone(&state.geo),
        sweep_interval,
        cancel.clone(),
    ));

    server::serve(Arc::clone(&state), &bind_addr, cancel.clone())
        .await
        .with_context(|| format!("HTTP server on {} failed", bind_addr))?;

    cancel.cancel();
    let _ = sweep.await;

    tracing::info!("Control plane shutdown complete");
    Ok(())
}

async fn open_store(config: &ControlPlaneConfig) -> Result<StateStore> {
    let store_config = &config.store;
    let keys = KeySpace::new(store_config.key_prefix.clone());
    let store = match store_config.backend {
        StoreBackendKind::Memory => {
            tracing::warn!("Using in-memory store - state is lost on restart");
            StateStore::new(
                Arc::new(MemoryBackend::new()),
                keys,
                store_config.op_timeout,
            )
        }
        StoreBackendKind::Redis => {
            let backend = RedisBackend::connect(&store_config.url)
                .await
                .with_context(|| format!("Failed to connect to redis at {}", store_config.url))?;
            StateStore::new(Arc::new(backend), keys, store_config.op_timeout)
        }
    };
    Ok(store)
}
