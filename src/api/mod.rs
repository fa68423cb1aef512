//! HTTP surface.
//!
//! A thin axum layer over the dispatcher, store, and bridge. Every `/v1`
//! request carries `X-Tenant-Id` (enforced by middleware) plus optional
//! `X-User-Id` / `X-User-Role` headers; responses are JSON and errors
//! follow one envelope.

pub mod handlers;
pub mod middleware;
pub mod responses;
pub mod routes;

pub use handlers::AppState;
pub use middleware::RequestContext;
pub use responses::ApiError;
pub use routes::create_router;
