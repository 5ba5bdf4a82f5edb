pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::infra::http::middleware::log_responses;

pub fn build_api_router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/api/v1/projects/{project_id}/exports",
            post(handlers::submit_export),
        )
        .route("/api/v1/exports/{job_id}", get(handlers::export_status))
        .route(
            "/api/v1/exports/{job_id}/download",
            get(handlers::download_export),
        )
        .route(
            "/api/v1/exports/{job_id}/cancel",
            post(handlers::cancel_export),
        )
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::require_caller))
        .layer(axum_middleware::from_fn(log_responses))
}
