use axum::extract::{FromRequest, FromRequestParts};
use axum::http::{header, request::Parts, HeaderMap};
use http_errors::ApiError;

use crate::api::rest::error::tag_request;
use crate::contract::model::ClientEnvironment;
use crate::errors;

/// JSON body whose rejection renders as the standard error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string whose rejection renders as the standard error body.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

pub fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-request-id").and_then(|v| v.to_str().ok())
}

/// Client IP from `x-forwarded-for` (first hop) or `x-real-ip`, plus the user agent.
pub fn client_environment(headers: &HeaderMap) -> ClientEnvironment {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let ip = header_str("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header_str("x-real-ip"))
        .unwrap_or("unknown")
        .to_string();
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    ClientEnvironment { ip, user_agent }
}

/// Shared secret for batch/admin routes, installed as a request extension.
#[derive(Clone, Debug)]
pub struct BatchToken(pub Option<String>);

/// Proof that the request carried `Authorization: Bearer <batch token>`.
pub struct BatchAuth;

impl<S> FromRequestParts<S> for BatchAuth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let with_id = |err: ApiError| tag_request(err, request_id(&parts.headers));

        let expected = match parts.extensions.get::<BatchToken>() {
            Some(BatchToken(Some(token))) if !token.is_empty() => token,
            _ => {
                return Err(with_id(
                    errors::BATCH_DISABLED.to_error("No batch token is configured"),
                ))
            }
        };

        let presented = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);

        match presented {
            Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => Ok(BatchAuth),
            _ => {
                tracing::warn!(path = %parts.uri.path(), "Rejected batch request with bad credentials");
                Err(with_id(
                    errors::UNAUTHORIZED.to_error("Missing or invalid bearer token"),
                ))
            }
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
