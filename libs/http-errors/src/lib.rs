//! Catalog-driven JSON error bodies for the REST surface.
//!
//! Every REST error renders as `{ "error", "code", "timestamp", "request_id" }`
//! with the HTTP status taken from a static [`ErrDef`].
use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Static error definition from the catalog.
#[derive(Debug, Clone, Copy)]
pub struct ErrDef {
    pub status: u16,
    pub code: &'static str,
    pub title: &'static str,
}

impl ErrDef {
    pub const fn new(status: u16, code: &'static str, title: &'static str) -> Self {
        Self {
            status,
            code,
            title,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Build the response body with an occurrence-specific message.
    #[inline]
    pub fn to_error(&self, detail: impl Into<String>) -> ApiError {
        ApiError {
            status: self.status_code(),
            body: ErrorResponse::new(detail, self.code),
        }
    }
}

/// Standard API error body.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
    /// Machine-readable error code from the catalog
    pub code: String,
    /// RFC3339 timestamp when the error occurred
    pub timestamp: String,
    /// Request ID for tracking, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id: None,
        }
    }
}

/// Axum response wrapper carrying status + body.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.body.request_id = Some(id.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = %self.body.code, error = %self.body.error, "request failed");
        }
        (self.status, Json(self.body)).into_response()
    }
}

/// Malformed request input, shared by every extractor rejection.
pub const INVALID_REQUEST: ErrDef = ErrDef::new(400, "INVALID_REQUEST", "Invalid request");

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        INVALID_REQUEST.to_error(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        INVALID_REQUEST.to_error(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        INVALID_REQUEST.to_error(rejection.body_text())
    }
}
