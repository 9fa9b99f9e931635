use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// API Routes - REST API for programmatic access
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // Generation and safety
            .route("/generate", post(handlers::api::generate_sql))
            .route("/validate", post(handlers::api::validate_sql))
            // Provider settings
            .route(
                "/providers",
                get(handlers::api::get_providers).put(handlers::api::update_providers),
            )
            // Schema management
            .route("/schema/refresh", post(handlers::api::refresh_schema))
            // System status
            .route("/status", get(handlers::api::system_status)),
    )
}
