use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::error::ApiError;

/// Header the upstream authentication layer sets to the authenticated user.
pub const CALLER_HEADER: &str = "x-folio-user";

/// Authenticated user on whose behalf a request runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

impl Caller {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub async fn require_caller(mut request: Request<Body>, next: Next) -> Response {
    let caller = request
        .headers()
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| Caller(value.to_string()));

    let Some(caller) = caller else {
        return ApiError::unauthorized().into_response();
    };

    request.extensions_mut().insert(caller);
    next.run(request).await
}
