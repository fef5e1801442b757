//! tovector service - HTTP API for uploads, vectorization and credits
//!
//! This is the main entry point for the tovector service.

use std::sync::Arc;

use tovector_service::telemetry::{init_tracing, LogFormat};
use tovector_service::{create_router, AppState, ServiceConfig, SupabaseStorage};
use tovector_store::PgStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing first so configuration loading is logged
    init_tracing(LogFormat::from_env());

    tracing::info!("Starting tovector service");

    // Load configuration from environment
    let config = ServiceConfig::from_env().map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        e
    })?;
    tracing::info!(
        listen_addr = %config.listen_addr,
        supabase_url = %config.supabase_url,
        bucket = %config.storage_bucket,
        stripe_configured = %config.stripe_secret_key.is_some(),
        webhook_secret_configured = %config.stripe_webhook_secret.is_some(),
        vectorizer_configured = %config.vectorizer_api_key.is_some(),
        redis_configured = %config.redis_url.is_some(),
        log_format = ?config.log_format,
        "Service configuration loaded"
    );

    // Connect to Postgres and bring the schema up to date
    tracing::info!(
        max_connections = config.database_max_connections,
        "Connecting to database"
    );
    let store = PgStore::connect(&config.database_url, config.database_max_connections)
        .await?
        .with_new_user_free_previews(config.pricing.new_user_free_previews);
    store.migrate().await?;

    let objects = SupabaseStorage::new(
        config.storage_api_url(),
        config.supabase_service_key.clone(),
        config.storage_bucket.clone(),
    )?;

    // Build app state
    let state = AppState::new(Arc::new(store), Arc::new(objects), config.clone());

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
