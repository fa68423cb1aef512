//! Route table for the `/v1` API.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};
use super::middleware::tenant_context_middleware;

/// Build the service router.
///
/// Everything under `/v1` requires the tenant header; `/v1/health` is the
/// one unauthenticated probe endpoint.
pub fn create_router(state: Arc<AppState>) -> Router {
    let tenant_routes = Router::new()
        .route("/schemas", post(handlers::create_schema))
        .route("/schemas/:id", get(handlers::get_schema))
        .route("/queues", post(handlers::create_queue))
        .route("/queues/:id", get(handlers::get_queue))
        .route("/samples", post(handlers::register_sample))
        .route("/samples/:id", get(handlers::get_sample))
        .route(
            "/queues/:queue_id/assignments/next",
            get(handlers::next_assignment),
        )
        .route("/labels", post(handlers::submit_label))
        .route("/datasets/:id", get(handlers::get_dataset))
        .route(
            "/datasets/:id/slices/:name",
            get(handlers::get_dataset_slice),
        )
        .layer(middleware::from_fn(tenant_context_middleware));

    let v1 = Router::new()
        .route("/health", get(handlers::health))
        .merge(tenant_routes);

    Router::new()
        .nest("/v1", v1)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
