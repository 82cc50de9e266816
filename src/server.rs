//! HTTP server and routes.

mod handlers;
mod state;

pub use state::AppState;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/cache/stats", get(handlers::cache_stats))
        .route("/cache/clear", post(handlers::cache_clear))
        .route("/cover/info", get(handlers::cover_info));

    Router::new()
        .route("/cover", get(handlers::cover))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
