//! HTTP surface: the listings lookup route, the batch price summary and the
//! cache debug endpoints.

pub mod handlers;
pub mod state;

pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/agent-tools/listings",
            post(handlers::post_listings).get(handlers::get_listings),
        )
        .route("/api/agent-tools/price-summary", post(handlers::price_summary))
        .route(
            "/api/debug/cache-status",
            get(handlers::cache_status).delete(handlers::clear_cache),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
