//! Flux API: HTTP transport for the global event feed.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::Router;

use crate::state::AppState;

/// Builds the application router: health check plus the event feed.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::events::router())
        .with_state(state)
}
