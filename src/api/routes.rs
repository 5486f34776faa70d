use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::request_id::{make_span_with_request_id, request_id_middleware};

use super::handlers;
use super::AppState;

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Boards
        .route("/api/requests", post(handlers::create_request))
        .route(
            "/api/requests/:slug",
            get(handlers::get_request).delete(handlers::delete_request),
        )
        // Submissions
        .route(
            "/api/requests/:slug/recommendations",
            post(handlers::submit_recommendations),
        )
        // Auto-recommendation
        .route("/api/recommendations/auto", get(handlers::auto_recommend))
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
