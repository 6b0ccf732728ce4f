use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Overlay page and its event feed
        .route("/", get(handlers::overlay_page))
        .route("/events", get(handlers::display_events))
        // Agent control
        .route("/status", get(handlers::agent_status))
        .route("/shutdown", post(handlers::shutdown))
        // The page may also be opened from disk
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
