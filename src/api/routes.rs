use axum::http::{header, Method};
use axum::{
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::api::handlers::{self, AppState};

/// Largest accepted request body; only `/api/ask` takes one
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Create the router with all endpoints
pub fn create_router(state: AppState) -> Router {
    // Read-only query API
    let api_routes = Router::new()
        .route("/search", get(handlers::search_meals))
        .route("/meals/:id", get(handlers::get_meal))
        .route("/ask", post(handlers::ask))
        .route("/stats", get(handlers::get_stats))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state);

    Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
                .allow_origin(tower_http::cors::Any)
                .max_age(Duration::from_secs(3600)),
        )
        .layer(TraceLayer::new_for_http())
}
