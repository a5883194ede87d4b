//! Metering service entry point.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metering_service::{create_router, AppState, ServiceConfig};
use metering_store::PgStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,metering=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting metering service");

    let config = ServiceConfig::from_env();
    tracing::info!(
        listen_addr = %config.listen_addr,
        processor_configured = %config.processor_api_url.is_some(),
        directory_configured = %config.directory_url.is_some(),
        media_configured = %config.media_url.is_some(),
        notifier_configured = %config.notify_url.is_some(),
        "Service configuration loaded"
    );

    let store = PgStore::connect(&config.database_url, config.db_max_connections).await?;
    store.migrate().await?;
    tracing::info!("Database migrations applied");

    let state = AppState::new(Arc::new(store), config.clone());
    let app = create_router(state);

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
