//! Router configuration for the web server.

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    // Intake enforces the configured upload limit itself, chunk by chunk,
    // so the framework's whole-body cap is turned off.
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/modes", get(handlers::list_modes))
        .route("/api/task/create", post(handlers::create_task))
        .route("/api/ocr", post(handlers::run_ocr))
        .route("/api/progress/:task_id", get(handlers::progress_stream))
        .layer(DefaultBodyLimit::disable())
        .layer(cors_layer(&state.config.allowed_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let list: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(list))
        .allow_methods(Any)
        .allow_headers(Any)
}
