//! Retouch Service - HTTP API for device credits and subscriptions
//!
//! This is the main entry point for the retouch service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use retouch_service::{create_router, AppState, ServiceConfig, StoreBackend};
use retouch_store::{MemoryStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,retouch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Retouch Service");

    let config = ServiceConfig::from_env()?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        store_backend = ?config.store_backend,
        fal_configured = %config.fal_key.is_some(),
        webhook_auth_configured = %config.revenuecat_webhook_auth.is_some(),
        catalog_version = config.catalog.version,
        cohort = ?config.cohort,
        "Service configuration loaded"
    );

    let store = open_store(&config)?;

    let state = AppState::new(store, config.clone());
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store - balances are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "rocksdb-backend")]
        StoreBackend::RocksDb => {
            tracing::info!(path = %config.data_dir, "Opening RocksDB store");
            Ok(Arc::new(retouch_store::RocksStore::open(&config.data_dir)?))
        }
        #[cfg(not(feature = "rocksdb-backend"))]
        StoreBackend::RocksDb => {
            Err("STORE_BACKEND=rocksdb requires the rocksdb-backend feature".into())
        }
    }
}
