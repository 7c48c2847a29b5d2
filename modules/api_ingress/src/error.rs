use axum::{http::Uri, Extension};
use http_errors::{ApiError, ErrDef};

use crate::request_id::CorrelationId;

pub const ROUTE_NOT_FOUND: ErrDef = ErrDef::new(404, "ROUTE_NOT_FOUND", "Not found");

/// Fallback for paths no module registered.
pub async fn route_not_found(uri: Uri, rid: Option<Extension<CorrelationId>>) -> ApiError {
    tracing::debug!(path = %uri.path(), "No route matched");
    let err = ROUTE_NOT_FOUND.to_error(format!("No route for {}", uri.path()));
    match rid {
        Some(Extension(CorrelationId(id))) => err.with_request_id(id),
        None => err,
    }
}
