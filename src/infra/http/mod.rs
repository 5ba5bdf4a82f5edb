pub mod api;
mod middleware;

pub use api::{ApiState, build_api_router};
pub use middleware::RequestContext;

use axum::http::StatusCode;
use axum::{Router, middleware as axum_middleware, routing::get};

/// Full application router: the export API plus a liveness probe.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(|| async { StatusCode::NO_CONTENT }))
        .merge(build_api_router(state))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}
