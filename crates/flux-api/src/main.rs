//! Flux feed server entry point.

use std::sync::Arc;

use flux_api::config::ServerConfig;
use flux_api::error::AppError;
use flux_api::state::AppState;
use flux_event_store::{PgEventStore, schema};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Flux feed server");

    let config = ServerConfig::from_env()?;
    let addr = config.addr()?;

    // Create database connection pool and bring the schema up to date.
    let pool = config.store.connect().await?;
    schema::run_migrations(&pool).await?;

    let app_state =
        AppState::new(Arc::new(PgEventStore::new(pool))).with_page_size(config.page_size);

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = flux_api::build_app(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Flux feed server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
}
