pub mod api;
pub mod db;
pub mod detection;
pub mod events;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod perception;
pub mod report;
pub mod settings;
pub mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use db::Database;
use events::{EventStore, HttpEventStore, HttpEventStoreConfig};
use log::{info, warn};
use monitor::MonitorRegistry;
use settings::{Settings, SettingsStore};

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: MonitorRegistry,
    pub store: Arc<dyn EventStore>,
    pub settings: Arc<SettingsStore>,
}

impl AppState {
    /// Open the database, pick the event store and recover sessions left running by a
    /// previous process.
    pub async fn new(settings: Settings, settings_path: PathBuf) -> Result<Self> {
        let database = Database::new(settings.database_path.clone())?;

        let store: Arc<dyn EventStore> = match settings.event_service_url.as_deref() {
            Some(url) => {
                info!("Forwarding events to event service at {url}");
                Arc::new(HttpEventStore::new(HttpEventStoreConfig::new(url))?)
            }
            None => Arc::new(database.clone()),
        };

        let registry = MonitorRegistry::new(database, Arc::clone(&store), settings.feed_max_age());
        registry
            .recover_interrupted()
            .await
            .context("failed to recover interrupted sessions")?;

        Ok(Self {
            registry,
            store,
            settings: Arc::new(SettingsStore::new(settings_path, settings)),
        })
    }
}

/// Serve the HTTP API until ctrl-c, then stop every monitored session.
pub async fn run(settings: Settings, settings_path: PathBuf) -> Result<()> {
    let address = settings.bind_address();
    let state = AppState::new(settings, settings_path).await?;
    let registry = state.registry.clone();

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!("Listening on {address}");

    axum::serve(listener, api::create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    registry.stop_all().await;
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
