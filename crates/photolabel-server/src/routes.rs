//! Router configuration for the web server.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health checks for container orchestration
        .route("/live", get(handlers::live))
        .route("/ready", get(handlers::ready))
        // Labeling page and its form actions
        .route("/", get(handlers::label_page))
        .route("/new-search", post(handlers::new_search))
        .route(
            "/label-image",
            post(handlers::label_image_form).get(handlers::label_image_query),
        )
        .route("/end-session", post(handlers::end_session))
        // Mirrored images
        .route("/files/*path", get(handlers::serve_file))
        // JSON API
        .route("/api/session", get(handlers::api_session))
        .route("/api/stats", get(handlers::api_stats))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
